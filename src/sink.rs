//! Presentation sink
//!
//! Every stage reports what it sees through a `PresentationSink`. Emission
//! is fire-and-forget: it never blocks the polling loop and never fails the
//! caller. A dashboard, a log stream or nothing at all can sit behind it.

use tokio::sync::mpsc;

use crate::executor::ReactionOutcome;
use crate::monitor::{ClassifiedEvent, EventKind, MonitorState};
use crate::orchestrator::StatusSummary;

#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// A classified (or degraded) observation.
    Classified(ClassifiedEvent),
    /// Liveness notice from the monitor.
    Heartbeat { state: MonitorState, endpoint: String, seen: usize },
    /// A qualifying buy was handed to the reaction path.
    ReactionTriggered { signature: String, value_sol: f64 },
    /// Result of one reaction.
    ReactionResult(ReactionOutcome),
    Status(StatusSummary),
}

pub trait PresentationSink: Send + Sync {
    fn emit(&self, event: SinkEvent);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PresentationSink for NoopSink {
    fn emit(&self, _event: SinkEvent) {}
}

/// Writes events through `log`; the default for the headless binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PresentationSink for LogSink {
    fn emit(&self, event: SinkEvent) {
        match event {
            SinkEvent::Classified(event) => {
                let icon = match event.kind {
                    EventKind::Buy => "🟢",
                    EventKind::Sell => "🔴",
                    EventKind::Activity => "⚪",
                    EventKind::Unknown => "❔",
                };
                log::info!(
                    "{} {} | {} | {}",
                    icon,
                    event.timestamp,
                    event.description,
                    event.signature
                );
            }
            SinkEvent::Heartbeat { state, endpoint, seen } => {
                log::info!("💓 {:?} | endpoint: {} | seen: {}", state, endpoint, seen);
            }
            SinkEvent::ReactionTriggered { signature, value_sol } => {
                log::info!("🎯 Reaction triggered by {:.4} SOL buy ({})", value_sol, signature);
            }
            SinkEvent::ReactionResult(outcome) => match &outcome {
                ReactionOutcome::Submitted(receipt) => log::info!(
                    "✅ Sold {} units{} | {}",
                    receipt.amount,
                    if receipt.dry_run { " (dry run)" } else { "" },
                    receipt.signature
                ),
                ReactionOutcome::Skipped(reason) => log::info!("⏭️  Reaction skipped: {}", reason),
                ReactionOutcome::Failed { amount, error } => {
                    log::error!("❌ Sell of {} units failed: {}", amount, error)
                }
            },
            SinkEvent::Status(summary) => log::info!("📊 {}", summary),
        }
    }
}

/// Forwards events to a consumer task (a dashboard, or a test).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PresentationSink for ChannelSink {
    fn emit(&self, event: SinkEvent) {
        // Receiver gone means nobody is watching; not an error.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(SinkEvent::Classified(ClassifiedEvent::observed("a")));
        sink.emit(SinkEvent::ReactionTriggered {
            signature: "a".to_string(),
            value_sol: 0.5,
        });

        match rx.recv().await {
            Some(SinkEvent::Classified(event)) => assert_eq!(event.signature, "a"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(SinkEvent::ReactionTriggered { .. })));
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(SinkEvent::Classified(ClassifiedEvent::observed("a")));
        NoopSink.emit(SinkEvent::Classified(ClassifiedEvent::observed("b")));
    }
}
