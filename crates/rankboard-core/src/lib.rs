// Library root: the leaderboard engine. Rank ordering, line formatting,
// pagination, page reconciliation, persisted state and the refresh
// orchestrator live here; network clients plug in through the `RankSource`
// and `PageSink` traits.

pub mod error;
pub mod format;
pub mod leaderboard;
pub mod orchestrator;
pub mod paginate;
pub mod rank;
pub mod reconcile;
pub mod roster;
pub mod source;
pub mod store;

pub use error::{LookupError, PublishError, StoreError};
pub use orchestrator::{AddOutcome, Orchestrator, RefreshHandle, RefreshSettings, RefreshTrigger};
pub use rank::{Division, RankInfo, RankKey, Tier};
pub use reconcile::{MessageId, PageSink, RenderedPage};
pub use roster::{IdentityKey, PlayerRecord, Roster};
pub use source::RankSource;
pub use store::{JsonFileStore, MemoryStore, PublishState, StateStore};
