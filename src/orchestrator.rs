//! Drives one full invocation: every configured target once, then one
//! state save.
//!
//! Targets are processed strictly sequentially; a failing target is
//! logged and skipped, it can neither stop later targets from being
//! evaluated nor prevent the final save.

use tracing::{debug, error, info, instrument};

use crate::clock::Clock;
use crate::config::Config;
use crate::engine::{DecisionEngine, EngineTuning};
use crate::gateway::CloudGateway;
use crate::notify::Notifier;
use crate::state::{History, StateStore};

/// Everything one invocation carries through its run. Replaces any
/// process-wide mutable state.
#[derive(Debug)]
pub struct RunContext {
    pub history: History,
}

/// What happened across the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
}

pub struct Orchestrator<'a> {
    gateway: &'a dyn CloudGateway,
    notifier: &'a dyn Notifier,
    clock: &'a dyn Clock,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        gateway: &'a dyn CloudGateway,
        notifier: &'a dyn Notifier,
        clock: &'a dyn Clock,
    ) -> Orchestrator<'a> {
        Self {
            gateway,
            notifier,
            clock,
        }
    }

    /// Loads history, runs one cycle per target, saves history once.
    ///
    /// Individual target failures are reflected in the summary, never
    /// propagated; a failed save is logged and tolerated (this cycle's
    /// history updates are lost, nothing else).
    #[instrument(skip_all)]
    pub async fn run(&self, config: &Config, store: &StateStore) -> RunSummary {
        let mut ctx = RunContext {
            history: store.load(),
        };

        let tuning = EngineTuning::from(&config.engine);
        let engine = DecisionEngine::new(self.gateway, self.notifier, self.clock, tuning);

        let mut summary = RunSummary::default();
        for target in &config.targets {
            summary.processed += 1;
            match engine.run_cycle(target, &mut ctx.history).await {
                Ok(outcome) => {
                    debug!("[{}] cycle finished: {outcome:?}", target.name);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("[{}] cycle failed: {e}", target.name);
                }
            }
        }

        if let Err(e) = store.save(&ctx.history) {
            error!("failed to persist state to {:?}: {e}", store.path());
        }

        info!(
            "run complete: {} target(s), {} failed",
            summary.processed, summary.failed
        );
        summary
    }
}
