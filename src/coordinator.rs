use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::DitraClient;
use crate::logger::MessageLogMode;
use crate::types::{AccountSnapshot, Thermostat};
use crate::{Error, Result};

/// Vendor poll cadence. Display-side refresh is a separate, shorter cadence
/// that only re-reads the published snapshot and never touches the network.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Trailing days of usage requested per cycle.
pub const DEFAULT_HISTORY_DEPTH: usize = 30;

type SnapshotCallback = Box<dyn Fn(&AccountSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
    /// Entered on an authentication failure. Terminal for this instance;
    /// build a new coordinator once fresh credentials are available.
    Halted,
}

pub struct CoordinatorBuilder {
    email: String,
    password: String,
    base_url: Option<String>,
    poll_interval: Duration,
    history_depth: usize,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl CoordinatorBuilder {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            base_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            history_depth: DEFAULT_HISTORY_DEPTH,
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn history_depth(mut self, days: usize) -> Self {
        self.history_depth = days;
        self
    }

    /// Register a callback fired after each successful cycle, with the
    /// freshly published snapshot.
    pub fn on_snapshot(mut self, f: impl Fn(&AccountSnapshot) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> EnergyCoordinator {
        let mut client = DitraClient::new(self.email, self.password);
        if let Some(url) = self.base_url {
            client = client.with_base_url(url);
        }
        if let (Some(mode), Some(path)) = (self.log_mode, self.log_path) {
            client = client
                .with_message_log(mode, &path)
                .expect("failed to open log file");
        }

        let (snapshot_tx, _) = watch::channel(None);

        EnergyCoordinator {
            client,
            poll_interval: self.poll_interval,
            history_depth: self.history_depth,
            state: CoordinatorState::Idle,
            generation: 0,
            snapshot_tx,
            snapshot_callbacks: self.snapshot_callbacks,
            last_error: None,
        }
    }
}

/// Owns the polling lifecycle for one credential pair and is the single
/// point of truth for the latest known [`AccountSnapshot`].
///
/// A refresh cycle runs login, thermostat listing, then usage fetches one
/// device at a time. Only a cycle that completes for every device publishes
/// a snapshot; any failure leaves the previous snapshot untouched.
pub struct EnergyCoordinator {
    client: DitraClient,
    poll_interval: Duration,
    history_depth: usize,
    state: CoordinatorState,
    generation: u64,
    snapshot_tx: watch::Sender<Option<Arc<AccountSnapshot>>>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    last_error: Option<String>,
}

impl EnergyCoordinator {
    pub fn builder(email: impl Into<String>, password: impl Into<String>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(email, password)
    }

    /// One synchronous refresh for host setup, before `run` takes over the
    /// timer. A [`Error::needs_reauth`] failure means the credentials are
    /// bad; anything else is transient and setup can be retried later.
    pub async fn first_refresh(&mut self) -> Result<()> {
        self.refresh().await
    }

    /// Run one full fetch cycle. On success the new snapshot replaces the
    /// old one atomically and subscribers are notified. On failure the
    /// previous snapshot stays published; an authentication failure
    /// additionally halts the coordinator.
    pub async fn refresh(&mut self) -> Result<()> {
        if self.state == CoordinatorState::Halted {
            return Err(Error::Halted);
        }

        let marker = RefreshMarker::begin(&mut self.state);
        debug!("starting refresh cycle");

        match run_cycle(&mut self.client, self.history_depth).await {
            Ok(thermostats) => {
                marker.finish(CoordinatorState::Idle);
                self.generation += 1;
                let snapshot = Arc::new(AccountSnapshot {
                    thermostats,
                    fetched_at: Utc::now(),
                    generation: self.generation,
                });
                info!(
                    thermostats = snapshot.thermostats.len(),
                    generation = snapshot.generation,
                    "refresh cycle complete"
                );
                self.snapshot_tx.send_replace(Some(Arc::clone(&snapshot)));
                for cb in &self.snapshot_callbacks {
                    cb(&snapshot);
                }
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                marker.finish(if e.needs_reauth() {
                    CoordinatorState::Halted
                } else {
                    CoordinatorState::Idle
                });
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Drive periodic refreshes until an authentication failure halts the
    /// loop. Call [`Self::first_refresh`] before this; the first scheduled
    /// refresh lands one full interval later. A cycle that overruns the
    /// interval causes the next tick to be skipped, never queued.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately; consume it here
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.refresh().await {
                Ok(()) => {}
                Err(e) if e.needs_reauth() => {
                    warn!(error = %e, "halting scheduled refresh, reauthentication required");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "refresh failed, keeping previous snapshot");
                }
            }
        }
    }

    /// Latest published snapshot, if any cycle has succeeded yet.
    pub fn current_snapshot(&self) -> Option<Arc<AccountSnapshot>> {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch handle for snapshot changes. Receivers stay valid while the
    /// coordinator is running elsewhere (e.g. inside `run`).
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<AccountSnapshot>>> {
        self.snapshot_tx.subscribe()
    }

    /// A refresh future dropped mid-cycle leaves the state `Idle`, not
    /// `Refreshing`.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Rendered form of the most recent cycle failure, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

async fn run_cycle(client: &mut DitraClient, history_depth: usize) -> Result<Vec<Thermostat>> {
    client.login().await?;
    let mut thermostats = client.list_thermostats().await?;
    for thermostat in &mut thermostats {
        thermostat.usage = client
            .fetch_usage(&thermostat.serial_number, history_depth)
            .await?;
    }
    Ok(thermostats)
}

/// Holds the `Refreshing` state for the duration of one cycle. If the
/// cycle's future is dropped mid-flight (the host raced `refresh` against
/// a shutdown or timeout), dropping the marker falls back to `Idle` so a
/// dead cycle is never reported as in progress.
struct RefreshMarker<'a> {
    state: &'a mut CoordinatorState,
}

impl<'a> RefreshMarker<'a> {
    fn begin(state: &'a mut CoordinatorState) -> Self {
        *state = CoordinatorState::Refreshing;
        Self { state }
    }

    fn finish(self, next: CoordinatorState) {
        *self.state = next;
    }
}

impl Drop for RefreshMarker<'_> {
    fn drop(&mut self) {
        if *self.state == CoordinatorState::Refreshing {
            *self.state = CoordinatorState::Idle;
        }
    }
}
