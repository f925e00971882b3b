// Refresh orchestration.
//
// The orchestrator owns the roster and the published page ids. A single
// worker task runs refresh cycles one at a time, either on a fixed interval
// or when a refresh is requested. Requests go through a one-slot queue, so
// any number of requests made while a cycle is running collapse into one
// trailing cycle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{LookupError, StoreError};
use crate::format::{format_entry, MarkerTable};
use crate::leaderboard::sorted_standings;
use crate::paginate::{clamp_body, paginate, Page, DEFAULT_PAGE_BUDGET};
use crate::rank::RankInfo;
use crate::reconcile::{reconcile, MessageId, PageSink, ReconcileReport, RenderedPage};
use crate::roster::{IdentityKey, PlayerRecord, Roster};
use crate::source::RankSource;
use crate::store::{PublishState, StateStore};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
pub const DEFAULT_PLACEHOLDER: &str = "_No players yet_";

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub interval: Duration,
    /// Upper bound for a single upstream call.
    pub fetch_timeout: Duration,
    /// How many rank fetches may be in flight at once.
    pub fetch_concurrency: usize,
    pub page_budget: usize,
    /// Line shown on the single page published for an empty roster.
    pub placeholder: String,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            page_budget: DEFAULT_PAGE_BUDGET,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub players: usize,
    /// Players whose rank could not be fetched and were marked unranked.
    pub fetch_failures: usize,
    pub pages: usize,
    pub reconcile: ReconcileReport,
    pub roster_saved: bool,
    pub publish_state_saved: bool,
}

/// Result of adding a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { key: IdentityKey, record: PlayerRecord },
    NotFound,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    source: Arc<dyn RankSource>,
    sink: Arc<dyn PageSink>,
    store: Arc<dyn StateStore>,
    markers: MarkerTable,
    settings: RefreshSettings,
    roster: Mutex<Roster>,
    /// Held for the whole of a cycle; doubles as the single-flight guard.
    publish: Mutex<PublishState>,
    phase: watch::Sender<RefreshPhase>,
}

impl Orchestrator {
    /// Build an orchestrator, loading roster and publish state from `store`.
    pub fn new(
        source: Arc<dyn RankSource>,
        sink: Arc<dyn PageSink>,
        store: Arc<dyn StateStore>,
        markers: MarkerTable,
        settings: RefreshSettings,
    ) -> Result<Self, StoreError> {
        let roster = store.load_roster()?;
        let publish = store.load_publish_state()?;
        info!(
            "Loaded {} players and {} published page ids",
            roster.len(),
            publish.message_ids.len()
        );
        let (phase, _) = watch::channel(RefreshPhase::Idle);

        Ok(Self {
            source,
            sink,
            store,
            markers,
            settings,
            roster: Mutex::new(roster),
            publish: Mutex::new(publish),
            phase,
        })
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    pub async fn roster_snapshot(&self) -> Roster {
        self.roster.lock().await.clone()
    }

    pub async fn published_ids(&self) -> Vec<MessageId> {
        self.publish.lock().await.message_ids.clone()
    }

    /// Resolve `name#tag`, fetch its rank and put it on the roster.
    ///
    /// A failed rank fetch still adds the player (as unranked). Failure to
    /// persist the roster is logged; the in-memory roster keeps the player.
    /// Does not publish; callers request a refresh afterwards.
    pub async fn add_player(&self, name: &str, tag: &str) -> Result<AddOutcome, LookupError> {
        let resolved = tokio::time::timeout(
            self.settings.fetch_timeout,
            self.source.resolve_identity(name, tag),
        )
        .await
        .map_err(|_| LookupError::Timeout)??;

        let Some(key) = resolved else {
            info!("Player {name}#{tag} not found");
            return Ok(AddOutcome::NotFound);
        };

        let rank = self.fetch_one(&key, tag).await.unwrap_or_default();
        let record = PlayerRecord::new(name, tag, rank);

        let mut roster = self.roster.lock().await;
        if roster.upsert(key.clone(), record.clone()).is_some() {
            info!("Updated player {name}#{tag}");
        } else {
            info!("Added player {name}#{tag}");
        }
        if let Err(e) = self.save_roster(roster.clone()).await {
            error!("Failed to persist roster after adding {name}#{tag}: {e}");
        }

        Ok(AddOutcome::Added { key, record })
    }

    /// Run one full refresh: refetch every rank, rebuild the leaderboard and
    /// reconcile it onto the sink. Concurrent callers are serialised.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut publish = self.publish.lock().await;
        self.phase.send_replace(RefreshPhase::Refreshing);

        let targets: Vec<(IdentityKey, String)> = self
            .roster
            .lock()
            .await
            .iter()
            .map(|(key, player)| (key.clone(), player.tag.clone()))
            .collect();
        info!("Refreshing ranks for {} players", targets.len());

        let fetched = self.fetch_all(targets).await;
        let fetch_failures = fetched.iter().filter(|(_, rank)| rank.is_none()).count();

        let (players, lines, roster_saved) = {
            let mut roster = self.roster.lock().await;
            for (key, rank) in fetched {
                roster.set_rank(&key, rank.unwrap_or_default());
            }
            let roster_saved = match self.save_roster(roster.clone()).await {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to persist roster: {e}");
                    false
                }
            };
            (roster.len(), self.render_lines(&roster), roster_saved)
        };

        let pages = self.render_pages(&lines);
        let report = reconcile(self.sink.as_ref(), &pages, &publish.message_ids).await;

        publish.message_ids = report.ids.clone();
        let publish_state_saved = match self.save_publish_state(publish.clone()).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist published page ids: {e}");
                false
            }
        };

        info!(
            "Refresh complete: {} players, {} pages ({} updated, {} created, {} removed, {} left behind, {} failed), {} fetch failures",
            players,
            pages.len(),
            report.updated(),
            report.created(),
            report.deleted(),
            report.delete_skipped(),
            report.failed(),
            fetch_failures
        );

        drop(publish);
        self.phase.send_replace(RefreshPhase::Idle);

        CycleReport {
            players,
            fetch_failures,
            pages: pages.len(),
            reconcile: report,
            roster_saved,
            publish_state_saved,
        }
    }

    // The store does blocking file IO, so saves run on the blocking pool.
    // Callers keep the roster lock held across the save, which keeps writes
    // in the same order as the edits.
    async fn save_roster(&self, roster: Roster) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_roster(&roster))
            .await
            .map_err(|e| StoreError::Unavailable(format!("roster save task failed: {e}")))?
    }

    async fn save_publish_state(&self, state: PublishState) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_publish_state(&state))
            .await
            .map_err(|e| StoreError::Unavailable(format!("publish state save task failed: {e}")))?
    }

    /// Fetch every rank with bounded concurrency. `None` marks a failed or
    /// timed-out fetch.
    async fn fetch_all(&self, targets: Vec<(IdentityKey, String)>) -> Vec<(IdentityKey, Option<RankInfo>)> {
        stream::iter(targets)
            .map(|(key, tag)| async move {
                let rank = self.fetch_one(&key, &tag).await;
                (key, rank)
            })
            .buffer_unordered(self.settings.fetch_concurrency.max(1))
            .collect()
            .await
    }

    async fn fetch_one(&self, key: &IdentityKey, tag: &str) -> Option<RankInfo> {
        match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch_rank(key, tag)).await {
            Ok(Ok(rank)) => Some(rank),
            Ok(Err(e)) => {
                warn!(%key, "Rank fetch failed, marking unranked: {e}");
                None
            }
            Err(_) => {
                warn!(%key, "Rank fetch timed out after {:?}, marking unranked", self.settings.fetch_timeout);
                None
            }
        }
    }

    fn render_lines(&self, roster: &Roster) -> Vec<String> {
        sorted_standings(roster)
            .iter()
            .enumerate()
            .map(|(i, standing)| {
                let rank = &standing.player.rank;
                let marker = self.markers.marker_for(rank.tier);
                format_entry(&standing.player.display_name, rank, i + 1, marker)
            })
            .collect()
    }

    /// Paginate and number the pages. An empty leaderboard still publishes
    /// one page holding the placeholder line.
    fn render_pages(&self, lines: &[String]) -> Vec<RenderedPage> {
        let budget = self.settings.page_budget;
        let mut pages = paginate(lines, budget);
        if pages.is_empty() {
            pages.push(Page::new(vec![self.settings.placeholder.clone()]));
        }
        let total = pages.len();
        pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| RenderedPage {
                number: i + 1,
                total,
                body: clamp_body(page.body(), budget),
            })
            .collect()
    }

    /// Spawn the refresh worker. The worker runs until
    /// [`RefreshHandle::shutdown`] is called.
    pub fn start(self: &Arc<Self>) -> RefreshHandle {
        let (requests_tx, requests_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(worker(Arc::clone(self), requests_rx, shutdown_rx));
        RefreshHandle {
            trigger: RefreshTrigger { tx: requests_tx },
            shutdown: shutdown_tx,
            task,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker and handles
// ---------------------------------------------------------------------------

/// How a refresh request was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    /// A new cycle is queued.
    Queued,
    /// A cycle was already queued; this request rides along with it.
    Merged,
    /// The worker has stopped.
    Stopped,
}

/// Cloneable handle used to request a refresh.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

impl RefreshTrigger {
    pub fn request(&self) -> RefreshRequest {
        match self.tx.try_send(()) {
            Ok(()) => RefreshRequest::Queued,
            Err(mpsc::error::TrySendError::Full(())) => RefreshRequest::Merged,
            Err(mpsc::error::TrySendError::Closed(())) => RefreshRequest::Stopped,
        }
    }
}

/// Owner of the running worker task.
pub struct RefreshHandle {
    trigger: RefreshTrigger,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn request_refresh(&self) -> RefreshRequest {
        self.trigger.request()
    }

    /// Stop the worker. An in-flight cycle runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Refresh worker ended abnormally: {e}");
        }
    }
}

async fn worker(
    orchestrator: Arc<Orchestrator>,
    mut requests: mpsc::Receiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let period = orchestrator.settings.interval;
    info!("Refresh worker started, interval {:?}", period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first timed
    // refresh happens after one full interval.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Refresh worker shutting down");
                break;
            }

            request = requests.recv() => {
                match request {
                    Some(()) => {
                        debug!("Refresh requested");
                        orchestrator.run_cycle().await;
                    }
                    None => {
                        info!("Refresh request channel closed");
                        break;
                    }
                }
            }

            _ = interval.tick() => {
                debug!("Scheduled refresh");
                orchestrator.run_cycle().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
