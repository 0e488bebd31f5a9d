use crate::config::{SessionConfig, secs};
use crate::rest;
use crate::scorer::Scorer;
use crate::trial::{TrialContext, TrialEngine};
use hemilat_core::{Device, DeviceResultExt, Devices, Hemifield, Marker, SessionError};
use hemilat_timing::{Clock, Deadline};
use rand::Rng;
use std::sync::Arc;
use tracing::info;

/// Consecutive misses within a block.
///
/// Only a response clears the count, so once the threshold is reached every
/// further miss raises the alarm again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissStreak {
    count: u32,
    threshold: u32,
}

impl MissStreak {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Counts a miss and reports whether the alarm should fire.
    pub fn record_miss(&mut self) -> bool {
        self.count += 1;
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Runs time-budgeted blocks of trials on alternating hemifields.
pub struct BlockController<C: Clock, R: Rng> {
    config: Arc<SessionConfig>,
    clock: C,
    engine: TrialEngine<C, R>,
    scorer: Scorer,
    streak: MissStreak,
    side: Hemifield,
    sequence_number: u64,
}

impl<C: Clock, R: Rng> BlockController<C, R> {
    /// Picks the starting side at random, once per session.
    pub fn new(config: Arc<SessionConfig>, clock: C, mut rng: R) -> Self {
        let side = Hemifield::from_left(rng.random_bool(0.5));
        let streak = MissStreak::new(config.task.max_missed);
        let engine = TrialEngine::new(Arc::clone(&config), clock.clone(), rng);
        Self {
            config,
            clock,
            engine,
            scorer: Scorer::new(),
            streak,
            side,
            sequence_number: 0,
        }
    }

    /// Side of the block currently running, or the one to be flipped from
    /// when the next block starts.
    pub fn side(&self) -> Hemifield {
        self.side
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn run_all(&mut self, devices: &mut Devices) -> Result<(), SessionError> {
        for block in 1..=self.config.task.blocks {
            self.run_block(block, devices)?;
        }
        Ok(())
    }

    /// Runs trials until the block budget is spent, then rests.
    ///
    /// The budget is only checked between trials; a trial in flight when it
    /// expires runs to completion.
    pub fn run_block(&mut self, block: usize, devices: &mut Devices) -> Result<(), SessionError> {
        let total = self.config.task.blocks;
        if self.config.task.alternate_hemifield {
            self.side = self.side.flipped();
        }
        self.streak.reset();

        devices
            .renderer
            .show_background(self.side)
            .device(Device::Renderer)?;
        devices
            .trigger
            .send(Marker::block_start(self.side))
            .device(Device::Trigger)?;
        info!("{} / {}", block, total);

        let budget = Deadline::new(self.clock.clone(), self.config.block_duration());
        while !budget.expired() {
            self.sequence_number += 1;
            let ctx = TrialContext {
                sequence_number: self.sequence_number,
                block,
                side: self.side,
            };
            self.engine
                .run(ctx, devices, &mut self.scorer, &mut self.streak)?;
        }

        devices
            .renderer
            .show_cue(&format!("{} / {}", block, total))
            .device(Device::Renderer)?;
        info!("Starting block switch rest period");
        rest(
            &self.clock,
            secs(self.config.fixation.rest_time),
            &self.config,
            devices,
        )
    }
}
