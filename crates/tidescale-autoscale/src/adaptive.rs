//! Adaptive variant: threshold-triggered scale-out plus vertical control of
//! the per-node bandwidth ceiling.
//!
//! Two history windows smooth demand: the short up window reacts quickly
//! and drives the frozen exit and ceiling increases; the longer down window
//! drives the scale-out trigger and ceiling decreases. A scale-out swaps in
//! the wide band so the ceiling does not chase the transient while new
//! nodes join; leaving FROZEN restores the narrow band.

use tracing::{debug, info, warn};

use tidescale_core::config::AdaptivePolicy;
use tidescale_core::{
    BandFactors, BoxFuture, EngineConfig, EngineState, EngineStatus, LedgerEntry, Variant,
};
use tidescale_metrics::Smoothing;

use crate::engine::{Collaborators, Engine, EngineCore, TickReport, Transition, VerticalAction};

pub struct AdaptiveEngine {
    core: EngineCore,
    policy: AdaptivePolicy,
    band: BandFactors,
}

impl AdaptiveEngine {
    pub fn new(config: EngineConfig, policy: AdaptivePolicy, collaborators: Collaborators) -> Self {
        let smoothing = Smoothing::dual(policy.up_history_len, policy.down_history_len);
        Self {
            core: EngineCore::new(config, collaborators, smoothing),
            band: policy.narrow,
            policy,
        }
    }

    async fn run_tick(&mut self) -> TickReport {
        let started = self.core.state;
        if self.core.observe().await.is_none() {
            return self.core.skip_tick();
        }
        let (Some(up), Some(down)) = (self.core.smoothing.up_mean(), self.core.smoothing.down_mean())
        else {
            return self.core.skip_tick();
        };

        let mut transition = None;
        match started {
            EngineState::Active => {
                if down >= self.policy.reserve_bw_limit && self.core.scale_out().await {
                    self.band = self.policy.wide;
                    transition = Some(Transition::ActiveToFrozen);
                }
            }
            EngineState::Frozen => {
                if self.core.check_frozen_exit(up).await {
                    self.band = self.policy.narrow;
                    transition = Some(Transition::FrozenToActive);
                }
            }
        }

        let vertical = self.vertical_control(up, down).await;

        self.core.account();
        self.core.report(transition, vertical, true)
    }

    /// At most one ceiling change per tick; raising wins over lowering.
    async fn vertical_control(&mut self, up: f64, down: f64) -> VerticalAction {
        let from = self.core.ceiling;
        let band = self.band;
        let cap = self.policy.scale_bw_limit;

        let (to, raising) = if up * band.up_check_factor > from {
            ((up * band.up_factor).clamp(0.0, cap), true)
        } else if down * band.down_check_factor < from {
            ((down * band.down_factor).clamp(0.0, cap), false)
        } else {
            debug!(
                ceiling = from,
                low = from / band.down_check_factor,
                high = from / band.up_check_factor,
                "demand within band"
            );
            return VerticalAction::Unchanged;
        };

        match self.core.apply_ceiling(to).await {
            Ok(()) if raising => {
                info!(state = %self.core.state, up, from, to, "bandwidth ceiling raised");
                VerticalAction::Raised { from, to }
            }
            Ok(()) => {
                info!(state = %self.core.state, down, from, to, "bandwidth ceiling lowered");
                VerticalAction::Lowered { from, to }
            }
            Err(e) => {
                warn!(error = %e, from, to, "bandwidth ceiling change failed");
                VerticalAction::Failed { target: to }
            }
        }
    }
}

impl Engine for AdaptiveEngine {
    fn variant(&self) -> Variant {
        Variant::Adaptive
    }

    fn tick(&mut self) -> BoxFuture<'_, TickReport> {
        Box::pin(self.run_tick())
    }

    fn finish_scale_out(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.core.finish_scale_out())
    }

    fn status(&self) -> EngineStatus {
        self.core.status(Variant::Adaptive)
    }

    fn ledger(&self) -> LedgerEntry {
        self.core.ledger()
    }

    fn config(&self) -> &EngineConfig {
        &self.core.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use tidescale_core::TidescaleConfig;
    use tidescale_core::config::PolicyConfig;

    use crate::testing::{FakeMetrics, Harness, engine_config};

    fn adaptive_engine(harness: &Harness, edit: impl FnOnce(&mut TidescaleConfig)) -> AdaptiveEngine {
        let config = engine_config(Variant::Adaptive, edit);
        let PolicyConfig::Adaptive(policy) = config.policy.clone() else {
            unreachable!("adaptive config");
        };
        AdaptiveEngine::new(config, policy, harness.collaborators())
    }

    #[tokio::test]
    async fn demand_above_band_raises_ceiling() {
        let harness = Harness::new(FakeMetrics::uniform(4, 10.0, 4.0));
        let mut engine = adaptive_engine(&harness, |c| c.engine.adaptive.reserve_bw = 15.0);

        let report = engine.tick().await;

        // 10 * 2.0 = 20 > 15, so min(10 * 3.0, 120)
        assert_eq!(report.vertical, VerticalAction::Raised { from: 15.0, to: 30.0 });
        assert_eq!(engine.status().ceiling_mbps, 30.0);
        assert_eq!(harness.controller.limit_calls(), vec!["30".to_string()]);
    }

    #[tokio::test]
    async fn raised_ceiling_is_capped() {
        let harness = Harness::new(FakeMetrics::uniform(4, 29.0, 1.0));
        let mut engine = adaptive_engine(&harness, |c| c.engine.adaptive.scale_bw_limit = 50.0);

        let report = engine.tick().await;

        assert_eq!(report.vertical, VerticalAction::Raised { from: 20.0, to: 50.0 });
    }

    #[tokio::test]
    async fn idle_demand_lowers_ceiling() {
        let harness = Harness::new(FakeMetrics::uniform(4, 2.0, 1.0));
        let mut engine = adaptive_engine(&harness, |_| {});

        let report = engine.tick().await;

        // up: 2 * 2.0 = 4 <= 20; down: 2 * 3.5 = 7 < 20, so 2 * 1.5
        assert_eq!(report.vertical, VerticalAction::Lowered { from: 20.0, to: 3.0 });
        assert_eq!(engine.status().ceiling_mbps, 3.0);
    }

    #[tokio::test]
    async fn demand_inside_band_leaves_ceiling() {
        let harness = Harness::new(FakeMetrics::uniform(4, 8.0, 1.0));
        let mut engine = adaptive_engine(&harness, |_| {});

        // up: 16 <= 20; down: 28 >= 20
        let report = engine.tick().await;
        assert_eq!(report.vertical, VerticalAction::Unchanged);
        assert!(harness.controller.limit_calls().is_empty());
    }

    #[tokio::test]
    async fn refused_limit_keeps_old_ceiling() {
        let harness = Harness::new(FakeMetrics::uniform(4, 10.0, 4.0));
        harness.controller.fail_limits.store(true, Ordering::SeqCst);
        let mut engine = adaptive_engine(&harness, |_| {});

        let report = engine.tick().await;

        assert_eq!(report.vertical, VerticalAction::Failed { target: 30.0 });
        assert_eq!(engine.status().ceiling_mbps, 20.0);
        assert_eq!(report.ledger.allocation_mb, 80.0);
    }

    #[tokio::test]
    async fn smoothed_down_demand_triggers_scale_out_and_widens_band() {
        let harness = Harness::new(FakeMetrics::uniform(4, 40.0, 5.0));
        let mut engine = adaptive_engine(&harness, |_| {});

        let report = engine.tick().await;

        assert_eq!(report.transition, Some(Transition::ActiveToFrozen));
        assert_eq!(harness.controller.scale_out_calls(), vec![2]);
        assert_eq!(engine.status().replicas, 6);
        assert_eq!(engine.band, engine.policy.wide);
        // the wide band applies to this tick's vertical decision: 40 * 4.0 capped at 120
        assert_eq!(report.vertical, VerticalAction::Raised { from: 20.0, to: 120.0 });
    }

    #[tokio::test]
    async fn no_second_scale_out_while_settling() {
        let harness = Harness::new(FakeMetrics::uniform(4, 40.0, 5.0));
        let mut engine = adaptive_engine(&harness, |c| {
            c.engine.adaptive.low_bound = 100.0;
            c.engine.adaptive.check_balance_window = 0;
        });

        engine.tick().await;
        // frozen exit on the next tick: 40 <= 100, streak 1 > 0
        let exit = engine.tick().await;
        assert_eq!(exit.transition, Some(Transition::FrozenToActive));
        assert_eq!(engine.band, engine.policy.narrow);

        // scale-out from the first trigger has not settled yet
        let suppressed = engine.tick().await;
        assert_eq!(suppressed.transition, None);
        assert_eq!(harness.controller.scale_out_calls().len(), 1);

        engine.finish_scale_out().await;
        let again = engine.tick().await;
        assert_eq!(again.transition, Some(Transition::ActiveToFrozen));
        assert_eq!(harness.controller.scale_out_calls().len(), 2);
        assert_eq!(engine.status().replicas, 8);
    }

    #[tokio::test]
    async fn failed_sample_restarts_cooldown() {
        let harness = Harness::new(FakeMetrics::uniform(4, 40.0, 5.0));
        let mut engine = adaptive_engine(&harness, |c| c.engine.adaptive.low_bound = 100.0);
        engine.tick().await;
        assert_eq!(engine.status().state, EngineState::Frozen);
        engine.finish_scale_out().await;

        // window 3: streaks 1..=3 stay frozen
        for _ in 0..3 {
            engine.tick().await;
        }
        assert_eq!(engine.status().frozen_streak, 3);

        harness.metrics.fail();
        let skipped = engine.tick().await;
        assert!(!skipped.sampled);
        assert_eq!(skipped.vertical, VerticalAction::Unchanged);
        assert_eq!(engine.status().frozen_streak, 0);

        harness.metrics.set_uniform(4, 40.0, 5.0);
        let report = engine.tick().await;
        assert_eq!(report.transition, None);
        assert_eq!(report.state, EngineState::Frozen);
        assert_eq!(engine.status().frozen_streak, 1);
    }

    #[tokio::test]
    async fn failed_sample_keeps_active_streak_at_zero() {
        let harness = Harness::new(FakeMetrics::uniform(4, 8.0, 1.0));
        let mut engine = adaptive_engine(&harness, |_| {});
        engine.tick().await;

        harness.metrics.fail();
        engine.tick().await;
        let status = engine.status();
        assert_eq!(status.state, EngineState::Active);
        assert_eq!(status.active_streak, 0);
        assert_eq!(status.frozen_streak, 0);
    }

    #[tokio::test]
    async fn frozen_exit_uses_fast_window() {
        let harness = Harness::new(FakeMetrics::uniform(4, 40.0, 5.0));
        let mut engine = adaptive_engine(&harness, |_| {});
        engine.tick().await;
        assert_eq!(engine.status().state, EngineState::Frozen);
        engine.finish_scale_out().await;

        // up window (3) forgets the spike after three quiet ticks, the
        // down window (5) still remembers it
        harness.metrics.set_uniform(6, 5.0, 5.0);
        for _ in 0..3 {
            engine.tick().await;
        }
        let status = engine.status();
        assert_eq!(status.smoothed_up, Some(5.0));
        assert_eq!(status.smoothed_down, Some(13.75));
        assert_eq!(status.frozen_streak, 3);

        let report = engine.tick().await;
        assert_eq!(report.transition, Some(Transition::FrozenToActive));
    }
}
