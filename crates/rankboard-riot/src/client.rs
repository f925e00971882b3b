// Riot Games HTTP client: account-v1 for identity lookup and league-v4 for
// ranked standings.

use std::time::Duration;

use async_trait::async_trait;
use rankboard_core::error::LookupError;
use rankboard_core::rank::RankInfo;
use rankboard_core::roster::IdentityKey;
use rankboard_core::source::RankSource;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::platform::Platform;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TOKEN_HEADER: &str = "X-Riot-Token";
const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
pub const DEFAULT_ACCOUNT_REGION: &str = "europe";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountDto {
    puuid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueEntryDto {
    queue_type: String,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    league_points: Option<i64>,
}

/// Extract the identity key from an account-v1 response body.
pub fn parse_account(body: &str) -> Result<IdentityKey, LookupError> {
    let account: AccountDto =
        serde_json::from_str(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(IdentityKey::new(account.puuid))
}

/// Pick the solo-queue standing out of a league-v4 entry list. Players
/// without a solo-queue entry are unranked.
pub fn parse_league_entries(body: &str) -> Result<RankInfo, LookupError> {
    let entries: Vec<LeagueEntryDto> =
        serde_json::from_str(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(entries
        .into_iter()
        .find(|entry| entry.queue_type == SOLO_QUEUE)
        .map(|entry| RankInfo::from_raw(entry.tier.as_deref(), entry.rank.as_deref(), entry.league_points))
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// RiotClient
// ---------------------------------------------------------------------------

/// Rank source backed by the Riot Games API.
pub struct RiotClient {
    http: reqwest::Client,
    api_key: String,
    account_region: String,
    /// Replaces every `https://{host}` base; used to point at a local server.
    base_override: Option<Url>,
}

impl RiotClient {
    /// Create a client. `account_region` is the regional routing value for
    /// account lookups ("europe", "americas", "asia").
    pub fn new(api_key: String, account_region: String, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            account_region,
            base_override: None,
        })
    }

    /// Send every request to `base` instead of the Riot hosts.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_override = Some(base);
        self
    }

    fn endpoint(&self, host: &str, segments: &[&str]) -> Result<Url, LookupError> {
        let mut url = match &self.base_override {
            Some(base) => base.clone(),
            None => Url::parse(&format!("https://{host}"))
                .map_err(|e| LookupError::Transport(format!("invalid host {host}: {e}")))?,
        };
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|_| LookupError::Transport(format!("cannot build path on {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url`; `Ok(None)` on 404, the body on success.
    async fn get(&self, url: Url) -> Result<Option<String>, LookupError> {
        debug!(%url, "riot request");
        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(Some(body))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Transport(e.to_string())
    }
}

#[async_trait]
impl RankSource for RiotClient {
    async fn resolve_identity(&self, name: &str, tag: &str) -> Result<Option<IdentityKey>, LookupError> {
        let host = format!("{}.api.riotgames.com", self.account_region);
        let url = self.endpoint(
            &host,
            &["riot", "account", "v1", "accounts", "by-riot-id", name, tag],
        )?;
        match self.get(url).await? {
            Some(body) => parse_account(&body).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_rank(&self, key: &IdentityKey, tag: &str) -> Result<RankInfo, LookupError> {
        let platform = Platform::from_tag(tag);
        let url = self.endpoint(
            &platform.host(),
            &["lol", "league", "v4", "entries", "by-puuid", key.as_str()],
        )?;
        match self.get(url).await? {
            Some(body) => parse_league_entries(&body),
            // No league record at all.
            None => Ok(RankInfo::unranked()),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rankboard_core::rank::{Division, Tier};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[test]
    fn parses_account_puuid() {
        let key = parse_account(r#"{"puuid":"abc-123","gameName":"Name","tagLine":"EUW"}"#).unwrap();
        assert_eq!(key.as_str(), "abc-123");
    }

    #[test]
    fn account_without_puuid_is_decode_error() {
        assert!(matches!(
            parse_account(r#"{"gameName":"Name"}"#),
            Err(LookupError::Decode(_))
        ));
    }

    #[test]
    fn picks_solo_queue_entry() {
        let body = r#"[
            {"queueType":"RANKED_FLEX_SR","tier":"DIAMOND","rank":"I","leaguePoints":99},
            {"queueType":"RANKED_SOLO_5x5","tier":"GOLD","rank":"II","leaguePoints":40,"wins":10}
        ]"#;
        assert_eq!(
            parse_league_entries(body).unwrap(),
            RankInfo::new(Tier::Gold, Some(Division::II), 40)
        );
    }

    #[test]
    fn no_solo_queue_entry_is_unranked() {
        let body = r#"[{"queueType":"RANKED_FLEX_SR","tier":"SILVER","rank":"I","leaguePoints":1}]"#;
        assert_eq!(parse_league_entries(body).unwrap(), RankInfo::unranked());
        assert_eq!(parse_league_entries("[]").unwrap(), RankInfo::unranked());
    }

    #[test]
    fn apex_entry_has_no_division() {
        let body = r#"[{"queueType":"RANKED_SOLO_5x5","tier":"CHALLENGER","rank":"I","leaguePoints":1200}]"#;
        assert_eq!(
            parse_league_entries(body).unwrap(),
            RankInfo::new(Tier::Challenger, None, 1200)
        );
    }

    #[test]
    fn unknown_tier_string_is_unranked_tier() {
        let body = r#"[{"queueType":"RANKED_SOLO_5x5","tier":"WOOD","rank":"V","leaguePoints":3}]"#;
        let rank = parse_league_entries(body).unwrap();
        assert_eq!(rank.tier, None);
        assert_eq!(rank.division, None);
        assert_eq!(rank.points, Some(3));
    }

    #[test]
    fn builds_escaped_paths() {
        let client = RiotClient::new("k".into(), "europe".into(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let url = client
            .endpoint("europe.api.riotgames.com", &["riot", "account", "v1", "accounts", "by-riot-id", "Some Name", "EUW"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://europe.api.riotgames.com/riot/account/v1/accounts/by-riot-id/Some%20Name/EUW"
        );
    }

    /// Serve canned responses, one per connection, and report each request
    /// head back to the test.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap();
                    read += n;
                    if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&buf[..read]).into_owned());
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        (Url::parse(&format!("http://{addr}/")).unwrap(), rx)
    }

    #[tokio::test]
    async fn resolves_and_fetches_over_http() {
        let (base, mut requests) = serve(vec![
            (200, r#"{"puuid":"p-1"}"#),
            (200, r#"[{"queueType":"RANKED_SOLO_5x5","tier":"MASTER","rank":"I","leaguePoints":210}]"#),
        ])
        .await;
        let client = RiotClient::new("secret".into(), "europe".into(), DEFAULT_REQUEST_TIMEOUT)
            .unwrap()
            .with_base_url(base);

        let key = client.resolve_identity("Alpha", "EUW").await.unwrap().unwrap();
        assert_eq!(key.as_str(), "p-1");
        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("GET /riot/account/v1/accounts/by-riot-id/Alpha/EUW "));
        assert!(head.to_ascii_lowercase().contains("x-riot-token: secret"));

        let rank = client.fetch_rank(&key, "EUW").await.unwrap();
        assert_eq!(rank, RankInfo::new(Tier::Master, None, 210));
        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("GET /lol/league/v4/entries/by-puuid/p-1 "));
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let (base, _requests) = serve(vec![(404, r#"{"status":{"status_code":404}}"#)]).await;
        let client = RiotClient::new("k".into(), "europe".into(), DEFAULT_REQUEST_TIMEOUT)
            .unwrap()
            .with_base_url(base);
        assert_eq!(client.resolve_identity("Ghost", "EUW").await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_error_is_status_error() {
        let (base, _requests) = serve(vec![(503, "unavailable")]).await;
        let client = RiotClient::new("k".into(), "europe".into(), DEFAULT_REQUEST_TIMEOUT)
            .unwrap()
            .with_base_url(base);
        let err = client
            .fetch_rank(&IdentityKey::new("p"), "NA1")
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Status { status: 503, .. }));
    }
}
