//! Orchestrator
//!
//! Owns the lifecycle of the Event Monitor and the reaction path:
//!
//! ```text
//! EventMonitor ──ReactionRequest──► dispatcher ──spawn──► ReactionHandler
//!                                                          ├─ BalanceTracker::get_balance
//!                                                          ├─ disposal = floor(balance * pct / 100)
//!                                                          └─ ReactionExecutor::execute
//! ```
//!
//! Each reaction runs in its own task so a slow sell never delays the next
//! polling tick. Changing the watched asset stops the old monitor (its
//! timers are gone before the new monitor exists) and swaps the handler;
//! reactions already running finish on their own. Requests raised for a
//! mint that is no longer watched are dropped.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use solana_pubkey::Pubkey;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::balance::{disposal_amount, BalanceTracker};
use crate::config::Config;
use crate::current_timestamp;
use crate::executor::{
    ExecutionError, ExecutionGuard, ExecutionSettings, ReactionExecutor, ReactionOutcome, SkipReason,
    TransactionSubmitter,
};
use crate::monitor::{EventMonitor, MonitorDeps, MonitorSettings, MonitorState, MonitorStats, ReactionRequest};
use crate::parser::ParsingService;
use crate::rpc::{lock_pool, LedgerConnector, PooledClient, SharedEndpointPool};
use crate::sink::{PresentationSink, SinkEvent};

/// External collaborators, built once by the binary (or a test).
#[derive(Clone)]
pub struct Services {
    pub pool: SharedEndpointPool,
    pub connector: Arc<dyn LedgerConnector>,
    pub parser: Option<Arc<dyn ParsingService>>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub sink: Arc<dyn PresentationSink>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub monitor: MonitorSettings,
    pub execution: ExecutionSettings,
    pub sell_percentage: f64,
    /// Reaction requests buffered between monitor and dispatcher.
    pub reaction_buffer: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            monitor: MonitorSettings::from_config(config),
            execution: ExecutionSettings::from_config(config),
            sell_percentage: config.sell_percentage,
            reaction_buffer: 16,
        }
    }
}

/// Operator input; the binary feeds it from stdin and Ctrl-C.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    ChangeAsset(Pubkey),
    Status,
    Shutdown,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("watch"), Some(mint)) => Pubkey::from_str(mint)
                .map(OperatorCommand::ChangeAsset)
                .map_err(|e| format!("invalid mint '{}': {}", mint, e)),
            (Some("status"), None) => Ok(OperatorCommand::Status),
            (Some("quit") | Some("exit"), None) => Ok(OperatorCommand::Shutdown),
            _ => Err(format!("unknown command '{}' (watch <mint> | status | quit)", line.trim())),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReactionStats {
    pub triggered: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
}

impl ReactionStats {
    fn record(&self, outcome: &ReactionOutcome) {
        let counter = match outcome {
            ReactionOutcome::Submitted(_) => &self.succeeded,
            ReactionOutcome::Skipped(_) => &self.skipped,
            ReactionOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub watched_mint: Option<String>,
    pub running: bool,
    pub monitor_state: MonitorState,
    pub endpoint: String,
    pub events: u64,
    pub buys: u64,
    pub skipped_ticks: u64,
    pub rotations: u64,
    pub reactions_triggered: u64,
    pub reactions_succeeded: u64,
    pub reactions_failed: u64,
    pub reactions_skipped: u64,
    pub reaction_in_flight: bool,
    pub timestamp: i64,
}

impl std::fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {:?} | events: {} (buys: {}) | reactions: {} ok / {} failed / {} skipped of {}{} | endpoint: {}",
            self.watched_mint.as_deref().unwrap_or("<no asset>"),
            self.monitor_state,
            self.events,
            self.buys,
            self.reactions_succeeded,
            self.reactions_failed,
            self.reactions_skipped,
            self.reactions_triggered,
            if self.reaction_in_flight { " (in flight)" } else { "" },
            self.endpoint
        )
    }
}

/// State shared between the orchestrator, the dispatcher and reaction tasks.
struct Shared {
    pool: SharedEndpointPool,
    sink: Arc<dyn PresentationSink>,
    guard: ExecutionGuard,
    monitor_stats: Arc<MonitorStats>,
    reaction_stats: ReactionStats,
    watched: Mutex<Option<Pubkey>>,
    running: AtomicBool,
    monitor_state: Mutex<Option<watch::Receiver<MonitorState>>>,
    handler: RwLock<Option<Arc<ReactionHandler>>>,
}

impl Shared {
    fn summary(&self) -> StatusSummary {
        let stats = &self.monitor_stats;
        let reactions = &self.reaction_stats;
        let state = self
            .monitor_state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(MonitorState::Stopped);
        let watched = *self.watched.lock().unwrap_or_else(|p| p.into_inner());

        StatusSummary {
            watched_mint: watched.map(|m| m.to_string()),
            running: self.running.load(Ordering::Relaxed),
            monitor_state: state,
            endpoint: lock_pool(&self.pool).current().rpc_url.clone(),
            events: MonitorStats::get(&stats.events),
            buys: MonitorStats::get(&stats.buys),
            skipped_ticks: MonitorStats::get(&stats.skipped_ticks),
            rotations: MonitorStats::get(&stats.rotations),
            reactions_triggered: reactions.triggered.load(Ordering::Relaxed),
            reactions_succeeded: reactions.succeeded.load(Ordering::Relaxed),
            reactions_failed: reactions.failed.load(Ordering::Relaxed),
            reactions_skipped: reactions.skipped.load(Ordering::Relaxed),
            reaction_in_flight: self.guard.is_busy(),
            timestamp: current_timestamp(),
        }
    }

    fn emit_status(&self) -> StatusSummary {
        let summary = self.summary();
        self.sink.emit(SinkEvent::Status(summary.clone()));
        summary
    }

    fn current_handler(&self) -> Option<Arc<ReactionHandler>> {
        self.handler.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Threshold-crossing buy → balance → disposal → sell, for one mint.
pub struct ReactionHandler {
    mint: Pubkey,
    tracker: BalanceTracker,
    executor: ReactionExecutor,
    sell_percentage: f64,
}

impl ReactionHandler {
    pub fn new(tracker: BalanceTracker, executor: ReactionExecutor, sell_percentage: f64) -> Self {
        Self {
            mint: executor.mint(),
            tracker,
            executor,
            sell_percentage,
        }
    }

    pub fn mint(&self) -> Pubkey {
        self.mint
    }

    pub async fn handle(&self, request: &ReactionRequest) -> ReactionOutcome {
        log::info!(
            "🎯 Buy of {:.4} SOL ({}) crossed the threshold",
            request.value_sol,
            request.signature
        );

        let balance = match self.tracker.get_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                log::warn!("⚠️  Balance read failed, reaction abandoned: {}", e);
                return ReactionOutcome::Failed {
                    amount: 0,
                    error: ExecutionError::Provider(e),
                };
            }
        };

        let amount = disposal_amount(balance, self.sell_percentage);
        if amount == 0 {
            log::info!("⏭️  No {} to sell (balance {})", self.mint, balance);
            return ReactionOutcome::Skipped(SkipReason::NonPositiveAmount);
        }

        log::info!(
            "📐 Balance {} × {}% → selling {}",
            balance,
            self.sell_percentage,
            amount
        );
        self.executor.execute(amount).await
    }
}

struct RunningMonitor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    services: Services,
    shared: Arc<Shared>,
    asset: Option<Pubkey>,
    monitor: Option<RunningMonitor>,
    reactions: mpsc::Sender<ReactionRequest>,
    dispatcher: JoinHandle<()>,
}

impl Orchestrator {
    /// Must be called inside a tokio runtime: the reaction dispatcher is
    /// spawned here.
    pub fn new(asset: Option<Pubkey>, settings: OrchestratorSettings, services: Services) -> Self {
        let shared = Arc::new(Shared {
            pool: services.pool.clone(),
            sink: services.sink.clone(),
            guard: ExecutionGuard::new(),
            monitor_stats: Arc::new(MonitorStats::default()),
            reaction_stats: ReactionStats::default(),
            watched: Mutex::new(asset),
            running: AtomicBool::new(false),
            monitor_state: Mutex::new(None),
            handler: RwLock::new(None),
        });

        let (reactions, rx) = mpsc::channel(settings.reaction_buffer.max(1));
        let dispatcher = tokio::spawn(dispatch_reactions(rx, shared.clone()));

        let mut orchestrator = Self {
            settings,
            services,
            shared,
            asset,
            monitor: None,
            reactions,
            dispatcher,
        };
        orchestrator.install_handler();
        orchestrator
    }

    pub fn watched_asset(&self) -> Option<Pubkey> {
        self.asset
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.shared.guard
    }

    /// Start monitoring. No-op when already running.
    pub fn start(&mut self) {
        if self.monitor.is_some() {
            return;
        }

        let deps = MonitorDeps {
            pool: self.services.pool.clone(),
            connector: self.services.connector.clone(),
            parser: self.services.parser.clone(),
            sink: self.services.sink.clone(),
            reactions: self.reactions.clone(),
            stats: self.shared.monitor_stats.clone(),
        };
        let monitor = EventMonitor::new(self.asset, self.settings.monitor.clone(), deps);
        *self.shared.monitor_state.lock().unwrap_or_else(|p| p.into_inner()) = Some(monitor.subscribe());

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(stop_rx));
        self.monitor = Some(RunningMonitor { stop, task });
        self.shared.running.store(true, Ordering::Relaxed);

        log::info!("▶️  Monitoring {}", describe(self.asset));
        self.shared.emit_status();
    }

    /// Stop monitoring and wait until the monitor's timers are gone.
    /// Reactions in flight are left alone.
    pub async fn stop(&mut self) {
        let Some(running) = self.monitor.take() else {
            return;
        };

        let _ = running.stop.send(true);
        if let Err(e) = running.task.await {
            log::error!("❌ Monitor task ended abnormally: {}", e);
        }
        self.shared.running.store(false, Ordering::Relaxed);

        log::info!("⏹️  Monitoring of {} stopped", describe(self.asset));
        self.shared.emit_status();
    }

    /// Redirect monitoring to `mint`. Restarts immediately if monitoring was
    /// running.
    pub async fn change_watched_asset(&mut self, mint: Pubkey) {
        if self.asset == Some(mint) {
            log::info!("Already watching {}", mint);
            return;
        }

        let was_running = self.is_running();
        self.stop().await;

        log::info!("🔀 Watched asset {} → {}", describe(self.asset), mint);
        self.asset = Some(mint);
        *self.shared.watched.lock().unwrap_or_else(|p| p.into_inner()) = Some(mint);
        self.install_handler();

        if was_running {
            self.start();
        } else {
            self.shared.emit_status();
        }
    }

    /// Current summary; also pushed to the sink.
    pub fn status(&self) -> StatusSummary {
        self.shared.emit_status()
    }

    /// Start, serve operator commands until `Shutdown` (or the command
    /// channel closes), then stop and let in-flight reactions finish.
    pub async fn run_until_shutdown(mut self, mut commands: mpsc::Receiver<OperatorCommand>) {
        self.start();

        while let Some(command) = commands.recv().await {
            match command {
                OperatorCommand::ChangeAsset(mint) => self.change_watched_asset(mint).await,
                OperatorCommand::Status => {
                    self.status();
                }
                OperatorCommand::Shutdown => break,
            }
        }

        self.shutdown().await;
    }

    /// Stop monitoring, close the reaction channel and wait for the
    /// dispatcher to drain.
    pub async fn shutdown(mut self) {
        log::info!("🛑 Shutting down");
        self.stop().await;

        let Orchestrator { reactions, dispatcher, shared, .. } = self;
        drop(reactions);
        if let Err(e) = dispatcher.await {
            log::error!("❌ Reaction dispatcher ended abnormally: {}", e);
        }
        shared.emit_status();
    }

    fn install_handler(&mut self) {
        let handler = self.asset.map(|mint| Arc::new(self.build_handler(mint)));
        *self.shared.handler.write().unwrap_or_else(|p| p.into_inner()) = handler;
    }

    fn build_handler(&self, mint: Pubkey) -> ReactionHandler {
        let client = Arc::new(PooledClient::new(
            self.services.pool.clone(),
            self.services.connector.clone(),
        ));
        let mut tracker = BalanceTracker::new(self.services.submitter.payer(), mint, client);
        tracker.initialize();

        let executor = ReactionExecutor::new(
            mint,
            self.services.submitter.clone(),
            self.shared.guard.clone(),
            self.settings.execution,
        );

        ReactionHandler::new(tracker, executor, self.settings.sell_percentage)
    }
}

fn describe(asset: Option<Pubkey>) -> String {
    asset.map(|m| m.to_string()).unwrap_or_else(|| "<no asset>".to_string())
}

/// Turn each request into an independent reaction task. Ends when every
/// sender is gone, after the spawned reactions complete.
async fn dispatch_reactions(mut rx: mpsc::Receiver<ReactionRequest>, shared: Arc<Shared>) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else { break };

                let Some(handler) = shared.current_handler() else {
                    log::warn!("⚠️  Reaction request {} with no watched asset, dropped", request.signature);
                    continue;
                };
                if handler.mint() != request.mint {
                    log::info!("⏭️  Stale request for {} dropped (now watching {})", request.mint, handler.mint());
                    continue;
                }

                shared.reaction_stats.triggered.fetch_add(1, Ordering::Relaxed);
                let shared = shared.clone();
                in_flight.spawn(async move {
                    let outcome = handler.handle(&request).await;
                    shared.reaction_stats.record(&outcome);
                    shared.sink.emit(SinkEvent::ReactionResult(outcome));
                    shared.emit_status();
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    log::error!("❌ Reaction task panicked: {}", e);
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            log::error!("❌ Reaction task panicked: {}", e);
        }
    }
}
