// Seam to the identity and ranked-standing services.

use async_trait::async_trait;

use crate::error::LookupError;
use crate::rank::RankInfo;
use crate::roster::IdentityKey;

/// Resolves players and fetches their ranked standing.
#[async_trait]
pub trait RankSource: Send + Sync {
    /// Map `name#tag` to a stable identity key. Unknown players yield
    /// `Ok(None)`.
    async fn resolve_identity(&self, name: &str, tag: &str) -> Result<Option<IdentityKey>, LookupError>;

    /// Fetch the current standing. `tag` selects the regional platform.
    /// A player without ranked data yields [`RankInfo::unranked`].
    async fn fetch_rank(&self, key: &IdentityKey, tag: &str) -> Result<RankInfo, LookupError>;
}
