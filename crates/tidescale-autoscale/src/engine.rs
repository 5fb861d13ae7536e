//! Engine capability and the state shared by both variants.
//!
//! A variant owns an [`EngineCore`] and supplies only its scale-out trigger
//! and, for the adaptive variant, vertical control. Sampling, the frozen
//! exit, scale-out execution and resource accounting live here so both
//! variants behave identically outside their policy.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tidescale_core::config::PolicyConfig;
use tidescale_core::{
    BandwidthLimit, BoxFuture, ClusterController, CollabResult, EngineConfig, EngineState,
    EngineStatus, LedgerEntry, MetricsSource, ShardBalanceSource, Variant,
};
use tidescale_metrics::{Sampler, Smoothing};

use crate::adaptive::AdaptiveEngine;
use crate::balance::BalanceGate;
use crate::basic::BasicEngine;

/// The external systems an engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: Arc<dyn MetricsSource>,
    pub shards: Arc<dyn ShardBalanceSource>,
    pub controller: Arc<dyn ClusterController>,
}

/// One autoscaling policy, ticked by the runner.
pub trait Engine: Send {
    fn variant(&self) -> Variant;

    /// Run one decision tick: trigger, frozen exit, vertical control,
    /// accounting, in that order.
    fn tick(&mut self) -> BoxFuture<'_, TickReport>;

    /// Complete a scale-out after the settle delay: push the current
    /// ceiling to every node, including the new ones.
    fn finish_scale_out(&mut self) -> BoxFuture<'_, ()>;

    fn status(&self) -> EngineStatus;

    /// Current ledger values; a pure function of engine state.
    fn ledger(&self) -> LedgerEntry;

    fn config(&self) -> &EngineConfig;
}

/// A state change made during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Scale-out issued; cooling down.
    ActiveToFrozen,
    /// Demand settled and shards balanced.
    FrozenToActive,
}

/// Outcome of vertical control for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerticalAction {
    Unchanged,
    Raised { from: f64, to: f64 },
    Lowered { from: f64, to: f64 },
    /// A change was decided but the controller refused it.
    Failed { target: f64 },
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub state: EngineState,
    pub transition: Option<Transition>,
    pub scaled_out: bool,
    pub vertical: VerticalAction,
    /// `false` when the metrics source failed and decisions were skipped.
    pub sampled: bool,
    pub ledger: LedgerEntry,
}

/// Build the engine selected by `config`.
pub fn build_engine(config: EngineConfig, collaborators: Collaborators) -> Box<dyn Engine> {
    match config.policy.clone() {
        PolicyConfig::Basic(policy) => Box::new(BasicEngine::new(config, policy, collaborators)),
        PolicyConfig::Adaptive(policy) => {
            Box::new(AdaptiveEngine::new(config, policy, collaborators))
        }
    }
}

/// State and mechanics common to every variant.
pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    controller: Arc<dyn ClusterController>,
    sampler: Sampler,
    gate: BalanceGate,
    pub(crate) smoothing: Smoothing,
    pub(crate) state: EngineState,
    pub(crate) replicas: u32,
    pub(crate) ceiling: f64,
    pub(crate) active_streak: u32,
    pub(crate) frozen_streak: u32,
    pub(crate) scale_out_in_flight: bool,
    resource_time_mb: f64,
    ticks: u64,
}

impl EngineCore {
    pub(crate) fn new(config: EngineConfig, collaborators: Collaborators, smoothing: Smoothing) -> Self {
        let sampler = Sampler::new(collaborators.metrics, config.sanity_ceiling);
        Self {
            replicas: config.initial_replicas,
            ceiling: config.initial_ceiling,
            controller: collaborators.controller,
            sampler,
            gate: BalanceGate::new(collaborators.shards),
            smoothing,
            state: EngineState::Active,
            active_streak: 0,
            frozen_streak: 0,
            scale_out_in_flight: false,
            resource_time_mb: 0.0,
            ticks: 0,
            config,
        }
    }

    /// Sample the cluster and feed the peak into the history windows.
    ///
    /// Returns the instantaneous peak, or `None` when the tick has no
    /// usable demand figure.
    pub(crate) async fn observe(&mut self) -> Option<f64> {
        match self.sampler.sample().await {
            Ok(demand) => {
                let peak = demand.peak();
                self.smoothing.push(peak);
                debug!(
                    avg_read = demand.avg_read,
                    avg_write = demand.avg_write,
                    peak,
                    nodes = demand.nodes,
                    discarded = demand.discarded,
                    up = ?self.smoothing.up_mean(),
                    down = ?self.smoothing.down_mean(),
                    ceiling = self.ceiling,
                    state = %self.state,
                    "demand sampled"
                );
                Some(peak)
            }
            Err(e) => {
                warn!(error = %e, "no demand this tick, skipping decisions");
                None
            }
        }
    }

    /// Issue one scale-out. Returns `true` when the cluster accepted it.
    ///
    /// At most one scale-out is outstanding: a trigger while the previous
    /// one is still settling is dropped.
    pub(crate) async fn scale_out(&mut self) -> bool {
        if self.scale_out_in_flight {
            debug!("scale-out still settling, trigger suppressed");
            return false;
        }
        let target = &self.config.target;
        let result = self
            .controller
            .scale_out(&target.namespace, &target.cluster_name, self.config.step)
            .await;
        match result {
            Ok(()) => {
                let from = self.replicas;
                self.replicas += self.config.step;
                self.state = EngineState::Frozen;
                self.active_streak = 0;
                self.frozen_streak = 0;
                self.scale_out_in_flight = true;
                info!(from, to = self.replicas, "scaled out, state FROZEN");
                true
            }
            Err(e) => {
                warn!(error = %e, step = self.config.step, "scale-out failed, staying ACTIVE");
                false
            }
        }
    }

    /// Advance the cooldown using `smoothed` demand. Returns `true` when the
    /// engine left FROZEN.
    pub(crate) async fn check_frozen_exit(&mut self, smoothed: f64) -> bool {
        if smoothed <= self.config.low_bound {
            self.frozen_streak += 1;
        } else {
            self.frozen_streak = 0;
        }
        debug!(
            streak = self.frozen_streak,
            window = self.config.check_balance_window,
            smoothed,
            "cooldown progress"
        );
        if self.frozen_streak <= self.config.check_balance_window {
            return false;
        }

        if self.gate.is_balanced().await {
            info!(streak = self.frozen_streak, "demand settled and shards balanced, state ACTIVE");
            self.state = EngineState::Active;
            self.frozen_streak = 0;
            true
        } else {
            info!("shards not balanced yet, restarting cooldown");
            self.frozen_streak = 0;
            false
        }
    }

    /// Apply `ceiling` to every selected node. The stored ceiling changes
    /// only when the controller accepts it.
    pub(crate) async fn apply_ceiling(&mut self, ceiling: f64) -> CollabResult<()> {
        let limit = BandwidthLimit::from_mbps(ceiling);
        let target = &self.config.target;
        self.controller
            .set_bandwidth_limit(
                &target.namespace,
                &target.selector_key,
                &target.selector_value,
                &limit,
            )
            .await?;
        self.ceiling = ceiling;
        Ok(())
    }

    pub(crate) async fn finish_scale_out(&mut self) {
        if !self.scale_out_in_flight {
            return;
        }
        let ceiling = self.ceiling;
        match self.apply_ceiling(ceiling).await {
            Ok(()) => info!(replicas = self.replicas, ceiling, "scale-out settled, ceiling applied"),
            Err(e) => warn!(error = %e, ceiling, "scale-out settled, re-applying ceiling failed"),
        }
        self.scale_out_in_flight = false;
    }

    /// Close a tick that produced no demand figure. The streak of the
    /// current state is broken; allocation is still accounted.
    pub(crate) fn skip_tick(&mut self) -> TickReport {
        match self.state {
            EngineState::Active => self.active_streak = 0,
            EngineState::Frozen => self.frozen_streak = 0,
        }
        self.account();
        self.report(None, VerticalAction::Unchanged, false)
    }

    /// Integrate allocation over one epoch.
    pub(crate) fn account(&mut self) {
        let epoch_secs = self.config.epoch.as_secs_f64();
        self.resource_time_mb += f64::from(self.replicas) * self.ceiling * epoch_secs;
        self.ticks += 1;
    }

    pub(crate) fn ledger(&self) -> LedgerEntry {
        LedgerEntry {
            allocation_mb: self.ceiling * f64::from(self.replicas),
            resource_time_mb: self.resource_time_mb,
        }
    }

    pub(crate) fn report(
        &self,
        transition: Option<Transition>,
        vertical: VerticalAction,
        sampled: bool,
    ) -> TickReport {
        TickReport {
            state: self.state,
            transition,
            scaled_out: transition == Some(Transition::ActiveToFrozen),
            vertical,
            sampled,
            ledger: self.ledger(),
        }
    }

    pub(crate) fn status(&self, variant: Variant) -> EngineStatus {
        let dual = self.smoothing.is_dual();
        EngineStatus {
            variant,
            state: self.state,
            replicas: self.replicas,
            ceiling_mbps: self.ceiling,
            smoothed_up: self.smoothing.up_mean(),
            smoothed_down: if dual { self.smoothing.down_mean() } else { None },
            active_streak: self.active_streak,
            frozen_streak: self.frozen_streak,
            scale_out_in_flight: self.scale_out_in_flight,
            ledger: self.ledger(),
            ticks: self.ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EPOCH, FakeMetrics, Harness, engine_config};

    #[test]
    fn build_engine_follows_policy() {
        let harness = Harness::new(FakeMetrics::uniform(4, 1.0, 1.0));
        let basic = build_engine(engine_config(Variant::Basic, |_| {}), harness.collaborators());
        let adaptive = build_engine(
            engine_config(Variant::Adaptive, |_| {}),
            harness.collaborators(),
        );
        assert_eq!(basic.variant(), Variant::Basic);
        assert_eq!(adaptive.variant(), Variant::Adaptive);
        assert_eq!(basic.config().epoch, EPOCH);
    }

    #[test]
    fn initial_status_is_active_with_configured_values() {
        let harness = Harness::new(FakeMetrics::uniform(4, 1.0, 1.0));
        let engine = build_engine(
            engine_config(Variant::Adaptive, |c| c.engine.initial_replicas = 5),
            harness.collaborators(),
        );
        let status = engine.status();
        assert_eq!(status.state, EngineState::Active);
        assert_eq!(status.replicas, 5);
        assert_eq!(status.ceiling_mbps, 20.0);
        assert_eq!(status.ledger.allocation_mb, 100.0);
        assert_eq!(status.smoothed_up, None);
        assert_eq!(status.ticks, 0);
    }

    #[tokio::test]
    async fn accounting_integrates_allocation_per_epoch() {
        let harness = Harness::new(FakeMetrics::uniform(4, 1.0, 1.0));
        let mut engine = build_engine(engine_config(Variant::Basic, |_| {}), harness.collaborators());

        engine.tick().await;
        engine.tick().await;

        // 4 replicas * 60 MB/s * 10 s, twice
        let ledger = engine.ledger();
        assert_eq!(ledger.resource_time_mb, 4800.0);
        assert_eq!(ledger.resource_time_gb(), 5);
        assert_eq!(ledger.allocation_mb, 240.0);
    }

    #[tokio::test]
    async fn ledger_read_is_idempotent() {
        let harness = Harness::new(FakeMetrics::uniform(4, 12.0, 3.0));
        let mut engine = build_engine(
            engine_config(Variant::Adaptive, |_| {}),
            harness.collaborators(),
        );
        engine.tick().await;

        assert_eq!(engine.ledger(), engine.ledger());
    }

    #[tokio::test]
    async fn metrics_failure_still_accounts() {
        let harness = Harness::new(FakeMetrics::uniform(4, 30.0, 10.0));
        harness.metrics.fail();
        let mut engine = build_engine(engine_config(Variant::Basic, |_| {}), harness.collaborators());

        let report = engine.tick().await;

        assert!(!report.sampled);
        assert_eq!(report.transition, None);
        assert_eq!(engine.status().ticks, 1);
        assert_eq!(engine.ledger().resource_time_mb, 2400.0);
    }

    #[tokio::test]
    async fn skipped_tick_zeroes_both_streaks() {
        let harness = Harness::new(FakeMetrics::uniform(4, 30.0, 10.0));
        let mut engine = build_engine(engine_config(Variant::Basic, |_| {}), harness.collaborators());
        engine.tick().await;
        engine.tick().await;
        assert_eq!(engine.status().active_streak, 2);

        harness.metrics.fail();
        let report = engine.tick().await;
        assert!(!report.sampled);
        assert_eq!(engine.status().active_streak, 0);
        assert_eq!(engine.status().frozen_streak, 0);
    }
}
