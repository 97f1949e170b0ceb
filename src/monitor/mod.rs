//! Event Monitor
//!
//! Polls the ledger for transactions touching the watched asset, classifies
//! them and hands qualifying buys to the reaction path.
//!
//! State machine: `Idle → Starting → Polling → Stopping → Stopped`.
//! Without a watched asset the monitor parks in `Idle` until it is stopped;
//! that is a normal waiting state, not a fault.
//!
//! One tick:
//! 1. Watch the bonding curve of the mint, or the mint itself when the curve
//!    cannot be derived.
//! 2. Fetch the most recent `signature_window` signatures.
//! 3. Drop signatures already in the seen set.
//! 4. Fetch detail (parsing service batch, else `getTransaction` per
//!    signature), classify, emit every event to the sink, mark seen.
//! 5. Buys at or above the threshold become `ReactionRequest`s on the
//!    reaction channel. The send never waits: a full channel drops the
//!    request with a warning.
//! 6. Rate-limit and connectivity errors strike the endpoint pool (which
//!    may rotate) and end the tick. Other provider errors end the tick.
//!    Nothing is retried within a tick.
//!
//! The pool is shared with the reaction path, which may rotate it too. Every
//! tick starts by rebinding to the pool's active endpoint, so a whole tick
//! talks to one endpoint and never strikes one the pool already left.

pub mod classifier;
pub mod seen;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solana_pubkey::Pubkey;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

pub use classifier::{ClassifiedEvent, Classifier, EventKind};
pub use seen::SeenSignatures;

use crate::config::Config;
use crate::parser::{ParsedTransaction, ParsingService};
use crate::pump::bonding_curve_address;
use crate::rpc::{lock_pool, Endpoint, LedgerClient, LedgerConnector, ProviderError, SharedEndpointPool};
use crate::sink::{PresentationSink, SinkEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Starting,
    Polling,
    Stopping,
    Stopped,
}

/// A qualifying buy, consumed exactly once by the reaction dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRequest {
    pub mint: Pubkey,
    pub signature: String,
    pub value_sol: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub signature_window: usize,
    pub seen_capacity: usize,
    pub dust_floor_sol: f64,
    pub buy_threshold_sol: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            signature_window: 10,
            seen_capacity: 1000,
            dust_floor_sol: 0.01,
            buy_threshold_sol: 0.2,
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            heartbeat_interval: config.heartbeat_interval,
            signature_window: config.signature_window,
            seen_capacity: config.seen_capacity,
            dust_floor_sol: config.dust_floor_sol,
            buy_threshold_sol: config.buy_threshold_sol,
        }
    }
}

/// Counters that outlive a single monitor (asset changes rebuild it).
#[derive(Debug, Default)]
pub struct MonitorStats {
    pub ticks: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub events: AtomicU64,
    pub buys: AtomicU64,
    pub degraded: AtomicU64,
    pub rotations: AtomicU64,
    pub dropped_requests: AtomicU64,
}

impl MonitorStats {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Collaborators injected into every monitor the orchestrator builds.
#[derive(Clone)]
pub struct MonitorDeps {
    pub pool: SharedEndpointPool,
    pub connector: Arc<dyn LedgerConnector>,
    pub parser: Option<Arc<dyn ParsingService>>,
    pub sink: Arc<dyn PresentationSink>,
    pub reactions: mpsc::Sender<ReactionRequest>,
    pub stats: Arc<MonitorStats>,
}

/// What one tick did; returned for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub fresh: usize,
    pub emitted: usize,
    pub degraded: usize,
    pub reactions: usize,
    pub dropped_reactions: usize,
    pub rotated: bool,
    /// Set when the tick ended early on a provider error.
    pub aborted: Option<String>,
}

#[derive(Debug, Clone)]
struct WatchedAsset {
    mint: Pubkey,
    /// Bonding curve, or the mint itself when derivation failed.
    activity_account: Pubkey,
    classifier: Classifier,
}

impl WatchedAsset {
    fn resolve(mint: Pubkey, dust_floor_sol: f64) -> Self {
        match bonding_curve_address(&mint) {
            Some(curve) => {
                log::info!("📍 Watching bonding curve {} of {}", curve, mint);
                Self {
                    mint,
                    activity_account: curve,
                    classifier: Classifier::new(&mint, Some(&curve), dust_floor_sol),
                }
            }
            None => {
                log::warn!("⚠️  No bonding curve for {}, querying the mint directly", mint);
                Self {
                    mint,
                    activity_account: mint,
                    classifier: Classifier::new(&mint, None, dust_floor_sol),
                }
            }
        }
    }
}

pub struct EventMonitor {
    asset: Option<WatchedAsset>,
    settings: MonitorSettings,
    deps: MonitorDeps,
    endpoint: Endpoint,
    client: Arc<dyn LedgerClient>,
    seen: SeenSignatures,
    state: watch::Sender<MonitorState>,
}

impl EventMonitor {
    pub fn new(asset: Option<Pubkey>, settings: MonitorSettings, deps: MonitorDeps) -> Self {
        let endpoint = lock_pool(&deps.pool).current().clone();
        let client = deps.connector.connect(&endpoint);
        let (state, _) = watch::channel(MonitorState::Idle);

        Self {
            asset: asset.map(|mint| WatchedAsset::resolve(mint, settings.dust_floor_sol)),
            seen: SeenSignatures::new(settings.seen_capacity),
            settings,
            deps,
            endpoint,
            client,
            state,
        }
    }

    pub fn watched_mint(&self) -> Option<Pubkey> {
        self.asset.as_ref().map(|a| a.mint)
    }

    /// Account whose signatures are polled.
    pub fn activity_account(&self) -> Option<Pubkey> {
        self.asset.as_ref().map(|a| a.activity_account)
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Follow state changes from outside (the monitor itself is moved into
    /// its task by `run`).
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Endpoint the current client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Rebind to the pool's active endpoint if someone rotated it.
    fn follow_pool(&mut self) {
        let active = lock_pool(&self.deps.pool).current().clone();
        if active != self.endpoint {
            log::info!("🔗 Monitor switching to {}", active.rpc_url);
            self.bind(active);
        }
    }

    fn bind(&mut self, endpoint: Endpoint) {
        self.client = self.deps.connector.connect(&endpoint);
        self.endpoint = endpoint;
    }

    fn set_state(&self, state: MonitorState) {
        log::debug!("Monitor state → {:?}", state);
        self.state.send_replace(state);
    }

    /// Poll and heartbeat until `shutdown` flips to `true` or its sender is
    /// dropped. Stopping cancels both timers; reactions already handed off
    /// are not touched.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.asset.is_none() {
            log::info!("💤 No watched asset configured, monitor idle");
            self.set_state(MonitorState::Idle);
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            self.set_state(MonitorState::Stopped);
            return;
        }

        self.set_state(MonitorState::Starting);
        log::info!(
            "🚀 Monitor starting (poll: {:?}, heartbeat: {:?}, window: {})",
            self.settings.poll_interval,
            self.settings.heartbeat_interval,
            self.settings.signature_window
        );

        let mut poll_timer = interval(self.settings.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat_timer = interval(self.settings.heartbeat_interval);
        heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.set_state(MonitorState::Polling);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = poll_timer.tick() => {
                    let report = self.poll_once().await;
                    if let Some(reason) = &report.aborted {
                        log::warn!("⏭️  Tick skipped: {}", reason);
                    } else if report.fresh > 0 {
                        log::debug!(
                            "Tick: {} fetched, {} new, {} reactions",
                            report.fetched, report.fresh, report.reactions
                        );
                    }
                }
                _ = heartbeat_timer.tick() => {
                    self.deps.sink.emit(SinkEvent::Heartbeat {
                        state: self.state(),
                        endpoint: lock_pool(&self.deps.pool).current().rpc_url.clone(),
                        seen: self.seen.len(),
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.set_state(MonitorState::Stopping);
        log::info!("🛑 Monitor stopping");
        self.set_state(MonitorState::Stopped);
    }

    /// One polling tick. Never fails: provider trouble is reported in the
    /// returned `TickReport`.
    pub async fn poll_once(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let Some(asset) = self.asset.clone() else {
            return report;
        };
        MonitorStats::bump(&self.deps.stats.ticks);
        self.follow_pool();

        let listed = match self
            .client
            .recent_signatures(&asset.activity_account, self.settings.signature_window)
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                self.on_provider_error(&e, &mut report);
                return report;
            }
        };
        report.fetched = listed.len();

        let mut batch = HashSet::new();
        let fresh: Vec<String> = listed
            .into_iter()
            .map(|info| info.signature)
            .filter(|sig| !self.seen.contains(sig) && batch.insert(sig.clone()))
            .collect();
        report.fresh = fresh.len();

        if !fresh.is_empty() {
            match self.deps.parser.clone() {
                Some(parser) => self.process_with_parser(parser.as_ref(), &asset, &fresh, &mut report).await,
                None => self.process_with_provider(&asset, &fresh, &mut report).await,
            }
        }

        if report.aborted.is_none() {
            lock_pool(&self.deps.pool).record_outcome(&self.endpoint, None);
        }
        report
    }

    async fn process_with_parser(
        &mut self,
        parser: &dyn ParsingService,
        asset: &WatchedAsset,
        fresh: &[String],
        report: &mut TickReport,
    ) {
        match parser.parse_transactions(fresh).await {
            Ok(parsed) => {
                let mut by_signature: HashMap<String, ParsedTransaction> = parsed
                    .into_iter()
                    .map(|tx| (tx.signature.clone(), tx))
                    .collect();

                for signature in fresh {
                    match by_signature.remove(signature) {
                        Some(tx) => {
                            let event = asset.classifier.classify(&tx);
                            self.accept(event, report);
                        }
                        None => {
                            log::debug!("Parsing service returned nothing for {}", signature);
                            self.accept_degraded(signature, report);
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("⚠️  Parsing service failed, degrading {} signatures: {}", fresh.len(), e);
                for signature in fresh {
                    self.accept_degraded(signature, report);
                }
            }
        }
    }

    async fn process_with_provider(&mut self, asset: &WatchedAsset, fresh: &[String], report: &mut TickReport) {
        for signature in fresh {
            match self.client.transaction(signature).await {
                Ok(Some(tx)) => {
                    let event = asset.classifier.classify(&tx);
                    self.accept(event, report);
                }
                Ok(None) => {
                    // Not indexed yet; stays unseen so the next tick retries.
                    log::debug!("Transaction {} not available yet", signature);
                }
                Err(ProviderError::Malformed(reason)) => {
                    log::warn!("⚠️  Malformed detail for {}: {}", signature, reason);
                    self.accept_degraded(signature, report);
                }
                Err(e) => {
                    self.on_provider_error(&e, report);
                    return;
                }
            }
        }
    }

    fn accept_degraded(&mut self, signature: &str, report: &mut TickReport) {
        report.degraded += 1;
        MonitorStats::bump(&self.deps.stats.degraded);
        self.accept(ClassifiedEvent::observed(signature), report);
    }

    /// Mark seen, emit, and raise a reaction request when the buy qualifies.
    fn accept(&mut self, event: ClassifiedEvent, report: &mut TickReport) {
        if self.seen.contains(&event.signature) {
            return;
        }
        self.seen.insert(&event.signature);

        match event.kind {
            EventKind::Buy | EventKind::Sell => log::info!(
                "🔎 {:?} {:.4} SOL | {}",
                event.kind,
                event.value_sol,
                event.signature
            ),
            _ => log::debug!("{:?} {} | {}", event.kind, event.description, event.signature),
        }

        MonitorStats::bump(&self.deps.stats.events);
        if event.kind == EventKind::Buy {
            MonitorStats::bump(&self.deps.stats.buys);
        }

        let request = self
            .asset
            .as_ref()
            .filter(|_| event.is_buy_at_least(self.settings.buy_threshold_sol))
            .map(|asset| ReactionRequest {
                mint: asset.mint,
                signature: event.signature.clone(),
                value_sol: event.value_sol,
                timestamp: event.timestamp,
            });

        self.deps.sink.emit(SinkEvent::Classified(event));
        report.emitted += 1;

        if let Some(request) = request {
            let signature = request.signature.clone();
            let value_sol = request.value_sol;
            match self.deps.reactions.try_send(request) {
                Ok(()) => {
                    report.reactions += 1;
                    self.deps.sink.emit(SinkEvent::ReactionTriggered { signature, value_sol });
                }
                Err(e) => {
                    report.dropped_reactions += 1;
                    MonitorStats::bump(&self.deps.stats.dropped_requests);
                    log::warn!("⚠️  Reaction request for {} dropped: {}", signature, e);
                }
            }
        }
    }

    fn on_provider_error(&mut self, error: &ProviderError, report: &mut TickReport) {
        MonitorStats::bump(&self.deps.stats.skipped_ticks);
        report.aborted = Some(error.to_string());

        let rotation = lock_pool(&self.deps.pool).record_outcome(&self.endpoint, Some(error));
        if let Some(rotation) = rotation {
            self.bind(rotation.to);
            report.rotated = true;
            MonitorStats::bump(&self.deps.stats.rotations);
        }
    }
}
