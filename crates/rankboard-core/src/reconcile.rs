// Page reconciliation against the publish surface.
//
// Each new page is matched by index to a previously published message:
// existing messages are edited in place, missing ones are (re)created, and
// surplus messages beyond the new page count are deleted. Every step records
// a `PageOutcome` and no failure stops the remaining steps.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PublishError;

/// Identifier of one published page on the external surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A page ready to publish. `number` is 1-based, `total` is the page count
/// of the whole leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub number: usize,
    pub total: usize,
    pub body: String,
}

/// The external surface that holds published pages.
#[async_trait]
pub trait PageSink: Send + Sync {
    /// Replace the content of an existing page. Must return
    /// [`PublishError::Missing`] when the page no longer exists.
    async fn update_page(&self, id: &MessageId, page: &RenderedPage) -> Result<(), PublishError>;

    /// Publish a new page and return its identifier.
    async fn create_page(&self, page: &RenderedPage) -> Result<MessageId, PublishError>;

    async fn delete_page(&self, id: &MessageId) -> Result<(), PublishError>;
}

/// What happened to one page (or one surplus message) during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Updated { index: usize, id: MessageId },
    Created { index: usize, id: MessageId },
    /// The previous message was gone; a new one replaced it.
    Recreated { index: usize, stale: MessageId, id: MessageId },
    /// Edit failed for a reason other than a missing message. The old
    /// message is kept and will be retried next cycle.
    UpdateFailed { index: usize, id: MessageId, reason: String },
    /// No message could be created for this page.
    CreateFailed { index: usize, reason: String },
    Deleted { id: MessageId },
    /// Deleting a surplus message failed (usually already gone); ignored.
    DeleteSkipped { id: MessageId, reason: String },
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Identifiers of the live pages, in page order. This replaces the
    /// previously persisted list.
    pub ids: Vec<MessageId>,
    pub outcomes: Vec<PageOutcome>,
}

impl ReconcileReport {
    fn count(&self, pred: impl Fn(&PageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(*o)).count()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Updated { .. }))
    }

    /// Pages created, including recreations of stale references.
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Created { .. } | PageOutcome::Recreated { .. }))
    }

    pub fn deleted(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Deleted { .. }))
    }

    /// Surplus pages whose delete failed and that were left in place.
    pub fn delete_skipped(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::DeleteSkipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                PageOutcome::UpdateFailed { .. } | PageOutcome::CreateFailed { .. }
            )
        })
    }
}

/// Synchronise `pages` onto `sink`, given the identifiers published by the
/// previous pass.
///
/// When every create succeeds, `report.ids.len() == pages.len()` whatever
/// the length of `previous` and whichever previous messages were removed
/// out-of-band.
pub async fn reconcile(
    sink: &dyn PageSink,
    pages: &[RenderedPage],
    previous: &[MessageId],
) -> ReconcileReport {
    let mut report = ReconcileReport {
        ids: Vec::with_capacity(pages.len()),
        outcomes: Vec::with_capacity(pages.len().max(previous.len())),
    };

    for (index, page) in pages.iter().enumerate() {
        let stale = match previous.get(index) {
            Some(id) => match sink.update_page(id, page).await {
                Ok(()) => {
                    debug!(page = page.number, %id, "updated page");
                    report.ids.push(id.clone());
                    report.outcomes.push(PageOutcome::Updated {
                        index,
                        id: id.clone(),
                    });
                    continue;
                }
                Err(e) if e.is_missing() => {
                    info!(page = page.number, %id, "published page vanished, recreating");
                    Some(id.clone())
                }
                Err(e) => {
                    warn!(page = page.number, %id, "failed to update page: {e}");
                    report.ids.push(id.clone());
                    report.outcomes.push(PageOutcome::UpdateFailed {
                        index,
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            },
            None => None,
        };

        match sink.create_page(page).await {
            Ok(id) => {
                debug!(page = page.number, %id, "created page");
                report.ids.push(id.clone());
                report.outcomes.push(match stale {
                    Some(stale) => PageOutcome::Recreated { index, stale, id },
                    None => PageOutcome::Created { index, id },
                });
            }
            Err(e) => {
                warn!(page = page.number, "failed to create page: {e}");
                report.outcomes.push(PageOutcome::CreateFailed {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    for id in previous.iter().skip(pages.len()) {
        match sink.delete_page(id).await {
            Ok(()) => {
                debug!(%id, "deleted surplus page");
                report.outcomes.push(PageOutcome::Deleted { id: id.clone() });
            }
            Err(e) => {
                debug!(%id, "ignoring failed delete of surplus page: {e}");
                report.outcomes.push(PageOutcome::DeleteSkipped {
                    id: id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
