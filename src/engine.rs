//! The per-target decision state machine.
//!
//! One cycle, one target: read traffic, read instance status, then act.
//!
//! ```text
//! traffic < quota:
//!   Stopped, failures >= max   → skip start, capacity alert (cooldown)
//!   Stopped, failures <  max   → start, poll until Running or timeout
//!       confirmed Running      → reset failures, re-arm capacity alert,
//!                                "resumed" notification (cooldown)
//!       timeout                → failures += 1, failure alert (cooldown)
//!   Running                    → reset failures, stay quiet
//!   Transitioning / Unknown    → hands off
//!
//! traffic >= quota:
//!   Running                    → stop, overlimit alert (24h cooldown)
//!   anything else              → keep stopped, overlimit alert (shared
//!                                cooldown with the stop case)
//! ```
//!
//! History is only mutated after the last gateway call of a branch has
//! succeeded, so a provider error aborts the cycle with the persisted
//! state exactly as it was.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::{Credentials, EngineConfig, TargetConfig};
use crate::gateway::{CloudGateway, GatewayError};
use crate::notify::{Notifier, Severity};
use crate::state::History;
use crate::{InstanceStatus, events};

/// Which side of the quota a traffic reading falls on.
///
/// The quota itself counts as over the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaEvaluation {
    Safe,
    OverLimit,
}

impl QuotaEvaluation {
    pub fn evaluate(current_gb: f64, quota_gb: f64) -> QuotaEvaluation {
        if current_gb < quota_gb {
            QuotaEvaluation::Safe
        } else {
            QuotaEvaluation::OverLimit
        }
    }
}

/// What a cycle did, for the orchestrator's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Instance was started and confirmed running.
    Resumed,
    /// Start was issued but the instance never reached `Running` in time.
    StartTimedOut,
    /// Too many consecutive failures; no start was attempted.
    StartSkipped,
    /// Instance was stopped because traffic reached the quota.
    StoppedOverLimit,
    /// Over quota, instance already not running; left as-is.
    KeptStoppedOverLimit,
    /// Traffic safe, instance running. Nothing to do.
    Steady,
    /// Instance is mid-transition; not interfered with.
    LeftTransitioning,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineTuning {
    pub notify_cooldown: Duration,
    pub overlimit_cooldown: Duration,
    pub max_start_failures: u32,
    pub start_timeout: Duration,
    pub start_poll_interval: Duration,
}

impl From<&EngineConfig> for EngineTuning {
    fn from(config: &EngineConfig) -> Self {
        EngineTuning {
            notify_cooldown: Duration::from_secs(config.notify_cooldown_secs),
            overlimit_cooldown: Duration::from_secs(config.overlimit_cooldown_secs),
            max_start_failures: config.max_start_failures,
            start_timeout: Duration::from_secs(config.start_timeout_secs),
            start_poll_interval: Duration::from_secs(config.start_poll_secs),
        }
    }
}

pub struct DecisionEngine<'a> {
    gateway: &'a dyn CloudGateway,
    notifier: &'a dyn Notifier,
    clock: &'a dyn Clock,
    tuning: EngineTuning,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(
        gateway: &'a dyn CloudGateway,
        notifier: &'a dyn Notifier,
        clock: &'a dyn Clock,
        tuning: EngineTuning,
    ) -> DecisionEngine<'a> {
        Self {
            gateway,
            notifier,
            clock,
            tuning,
        }
    }

    /// Runs one full decision cycle for one target.
    ///
    /// A [`GatewayError`] aborts the cycle with `history` untouched;
    /// the caller decides whether to continue with other targets.
    #[instrument(skip_all, fields(target = %target.name))]
    pub async fn run_cycle(
        &self,
        target: &TargetConfig,
        history: &mut History,
    ) -> Result<CycleOutcome, GatewayError> {
        let credentials = target.credentials();

        let traffic = self.gateway.query_traffic(&credentials).await?;
        let current_gb = traffic.gibibytes();

        let status = self
            .gateway
            .query_instance_status(&credentials, &target.instance_id)
            .await?;

        match QuotaEvaluation::evaluate(current_gb, target.traffic_quota_gb) {
            QuotaEvaluation::Safe => {
                self.handle_safe(target, &credentials, status, current_gb, history)
                    .await
            }
            QuotaEvaluation::OverLimit => {
                self.handle_overlimit(target, &credentials, status, current_gb, history)
                    .await
            }
        }
    }

    async fn handle_safe(
        &self,
        target: &TargetConfig,
        credentials: &Credentials,
        status: InstanceStatus,
        current_gb: f64,
        history: &mut History,
    ) -> Result<CycleOutcome, GatewayError> {
        match status {
            InstanceStatus::Stopped => {
                self.try_start(target, credentials, current_gb, history)
                    .await
            }

            InstanceStatus::Running => {
                history.reset_start_failures(&target.instance_id);
                debug!("[{}] traffic safe ({current_gb:.2}GB), instance running", target.name);
                Ok(CycleOutcome::Steady)
            }

            InstanceStatus::Transitioning | InstanceStatus::Unknown => {
                debug!(
                    "[{}] instance is in an intermediate state, not interfering",
                    target.name
                );
                Ok(CycleOutcome::LeftTransitioning)
            }
        }
    }

    async fn try_start(
        &self,
        target: &TargetConfig,
        credentials: &Credentials,
        current_gb: f64,
        history: &mut History,
    ) -> Result<CycleOutcome, GatewayError> {
        let failures = history.start_failures(&target.instance_id);

        if failures >= self.tuning.max_start_failures {
            warn!(
                "[{}] {failures} consecutive start failures, assuming no capacity, skipping retry",
                target.name
            );
            if self.cooldown_elapsed(history, target, events::NO_RESOURCE, self.tuning.notify_cooldown)
            {
                let body = format!(
                    "Machine: {}\nCurrent traffic: {current_gb:.2}GB\n\
                     ⚠️ {failures} consecutive start attempts have failed; the region may be \
                     out of capacity. Please check the cloud console manually!",
                    target.name
                );
                self.notifier
                    .notify("Capacity Alert", &body, Severity::Alert)
                    .await;
                history.mark_notified(&target.instance_id, events::NO_RESOURCE, self.clock.now());
            }
            return Ok(CycleOutcome::StartSkipped);
        }

        info!(
            "[{}] traffic safe ({current_gb:.2}GB), starting instance...",
            target.name
        );
        self.gateway
            .start_instance(credentials, &target.instance_id)
            .await?;

        let started = self.await_running(target, credentials).await?;

        if started {
            history.reset_start_failures(&target.instance_id);
            // re-arm the capacity alert for the next exhaustion episode
            history.clear_event(&target.instance_id, events::NO_RESOURCE);
            info!("[{}] instance is running again", target.name);

            if self.cooldown_elapsed(history, target, events::RESUMED, self.tuning.notify_cooldown) {
                let body = format!(
                    "Machine: {}\nCurrent traffic: {current_gb:.2}GB\nAction: resumed ✅",
                    target.name
                );
                self.notifier
                    .notify("Monitoring Resumed", &body, Severity::Ok)
                    .await;
                history.mark_notified(&target.instance_id, events::RESUMED, self.clock.now());
            }
            Ok(CycleOutcome::Resumed)
        } else {
            let failures = failures + 1;
            history.set_start_failures(&target.instance_id, failures);
            warn!(
                "[{}] start timed out, possibly out of capacity, {failures} failure(s) so far",
                target.name
            );

            if self.cooldown_elapsed(history, target, events::START_FAILED, self.tuning.notify_cooldown)
            {
                let body = format!(
                    "Machine: {}\nCurrent traffic: {current_gb:.2}GB\n\
                     ⚠️ Start was issued but the instance did not reach Running within {}s, \
                     {failures}/{} failure(s) so far. (The region may be out of capacity.)",
                    target.name,
                    self.tuning.start_timeout.as_secs(),
                    self.tuning.max_start_failures
                );
                self.notifier
                    .notify("Start Failure", &body, Severity::Alert)
                    .await;
                history.mark_notified(&target.instance_id, events::START_FAILED, self.clock.now());
            }
            Ok(CycleOutcome::StartTimedOut)
        }
    }

    /// Polls the instance status until it reaches `Running` or the
    /// configured timeout elapses. The poll interval is waited before
    /// each query, so the loop issues at most ceil(timeout / interval)
    /// queries.
    async fn await_running(
        &self,
        target: &TargetConfig,
        credentials: &Credentials,
    ) -> Result<bool, GatewayError> {
        let mut waited = Duration::ZERO;
        while waited < self.tuning.start_timeout {
            self.clock.sleep(self.tuning.start_poll_interval).await;
            waited += self.tuning.start_poll_interval;

            let status = self
                .gateway
                .query_instance_status(credentials, &target.instance_id)
                .await?;
            debug!(
                "[{}] waiting for start... current status: {status:?} ({}s)",
                target.name,
                waited.as_secs()
            );
            if status == InstanceStatus::Running {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn handle_overlimit(
        &self,
        target: &TargetConfig,
        credentials: &Credentials,
        status: InstanceStatus,
        current_gb: f64,
        history: &mut History,
    ) -> Result<CycleOutcome, GatewayError> {
        if status == InstanceStatus::Running {
            info!(
                "[{}] traffic over quota ({current_gb:.2}GB >= {}GB), stopping...",
                target.name, target.traffic_quota_gb
            );
            self.gateway
                .stop_instance(credentials, &target.instance_id)
                .await?;

            if self.cooldown_elapsed(history, target, events::OVERLIMIT, self.tuning.overlimit_cooldown)
            {
                let body = format!(
                    "Machine: {}\nCurrent traffic: {current_gb:.2}GB\nAction: emergency stop 🛑",
                    target.name
                );
                self.notifier
                    .notify("Traffic Alert", &body, Severity::Alert)
                    .await;
                history.mark_notified(&target.instance_id, events::OVERLIMIT, self.clock.now());
            }
            Ok(CycleOutcome::StoppedOverLimit)
        } else {
            info!(
                "[{}] over quota and already stopped - {current_gb:.2}GB",
                target.name
            );
            if self.cooldown_elapsed(history, target, events::OVERLIMIT, self.tuning.overlimit_cooldown)
            {
                let body = format!(
                    "Machine: {}\nCurrent traffic: {current_gb:.2}GB\n\
                     Status: traffic over quota, instance remains stopped 🛑",
                    target.name
                );
                self.notifier
                    .notify("Traffic Reminder", &body, Severity::Alert)
                    .await;
                history.mark_notified(&target.instance_id, events::OVERLIMIT, self.clock.now());
            }
            Ok(CycleOutcome::KeptStoppedOverLimit)
        }
    }

    fn cooldown_elapsed(
        &self,
        history: &History,
        target: &TargetConfig,
        event_key: &str,
        window: Duration,
    ) -> bool {
        history.cooldown_elapsed(&target.instance_id, event_key, window, self.clock.now())
    }
}
