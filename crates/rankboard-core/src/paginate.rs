// Content-aware pagination under a character budget.
//
// Lengths are counted in Unicode scalar values, which is how the publish
// surface counts embed description length for the text we produce.

/// Maximum characters in one page body.
pub const DEFAULT_PAGE_BUDGET: usize = 4096;

const ELLIPSIS: &str = "...";

/// One page of leaderboard lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub lines: Vec<String>,
}

impl Page {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Lines joined by a single newline.
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Greedily pack `lines` into pages whose joined body stays within `budget`.
///
/// A line longer than the whole budget is placed on a page of its own and
/// truncated to `budget - 1` characters. Every other line is kept intact and
/// in order. An empty input yields no pages.
pub fn paginate<S: AsRef<str>>(lines: &[S], budget: usize) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for line in lines {
        let line = line.as_ref();
        let line_len = char_len(line);

        if line_len > budget {
            if !current.is_empty() {
                pages.push(Page::new(std::mem::take(&mut current)));
                current_len = 0;
            }
            pages.push(Page::new(vec![truncate_chars(line, budget.saturating_sub(1))]));
            continue;
        }

        // +1 for the newline separator, except for the first line of a page.
        let added = line_len + usize::from(!current.is_empty());

        if current_len + added > budget {
            pages.push(Page::new(std::mem::take(&mut current)));
            current.push(line.to_string());
            current_len = line_len;
        } else {
            current.push(line.to_string());
            current_len += added;
        }
    }

    if !current.is_empty() {
        pages.push(Page::new(current));
    }

    pages
}

/// Hard-limit a rendered body to `budget` characters, replacing the tail
/// with an ellipsis when it is too long.
pub fn clamp_body(body: String, budget: usize) -> String {
    if char_len(&body) <= budget {
        return body;
    }
    let keep = budget.saturating_sub(ELLIPSIS.len());
    let mut clamped = truncate_chars(&body, keep);
    clamped.push_str(ELLIPSIS);
    clamped
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
