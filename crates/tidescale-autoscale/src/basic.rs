//! Basic variant: streak-triggered scale-out at a fixed per-node ceiling.
//!
//! One shared history window smooths demand for the frozen exit. The
//! scale-out trigger counts consecutive ticks whose instantaneous peak is
//! above `up_bound`.

use tidescale_core::config::BasicPolicy;
use tidescale_core::{BoxFuture, EngineConfig, EngineState, EngineStatus, LedgerEntry, Variant};
use tidescale_metrics::Smoothing;

use crate::engine::{Collaborators, Engine, EngineCore, TickReport, Transition, VerticalAction};

pub struct BasicEngine {
    core: EngineCore,
    policy: BasicPolicy,
}

impl BasicEngine {
    pub fn new(config: EngineConfig, policy: BasicPolicy, collaborators: Collaborators) -> Self {
        let smoothing = Smoothing::single(policy.history_len);
        Self {
            core: EngineCore::new(config, collaborators, smoothing),
            policy,
        }
    }

    async fn run_tick(&mut self) -> TickReport {
        let started = self.core.state;
        let Some(peak) = self.core.observe().await else {
            return self.core.skip_tick();
        };

        let mut transition = None;
        match started {
            EngineState::Active => {
                if peak > self.policy.up_bound {
                    self.core.active_streak += 1;
                    if self.core.active_streak >= self.policy.check_scale_out_window
                        && self.core.scale_out().await
                    {
                        transition = Some(Transition::ActiveToFrozen);
                    }
                } else {
                    self.core.active_streak = 0;
                }
            }
            EngineState::Frozen => {
                if let Some(smoothed) = self.core.smoothing.up_mean()
                    && self.core.check_frozen_exit(smoothed).await
                {
                    transition = Some(Transition::FrozenToActive);
                }
            }
        }

        self.core.account();
        self.core.report(transition, VerticalAction::Unchanged, true)
    }
}

impl Engine for BasicEngine {
    fn variant(&self) -> Variant {
        Variant::Basic
    }

    fn tick(&mut self) -> BoxFuture<'_, TickReport> {
        Box::pin(self.run_tick())
    }

    fn finish_scale_out(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.core.finish_scale_out())
    }

    fn status(&self) -> EngineStatus {
        self.core.status(Variant::Basic)
    }

    fn ledger(&self) -> LedgerEntry {
        self.core.ledger()
    }

    fn config(&self) -> &EngineConfig {
        &self.core.config
    }
}
