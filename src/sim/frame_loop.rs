//! Render, measure elapsed time, step the world, repeat until closed.

use crate::config::TimestepPolicy;
use crate::error::LoopError;
use crate::physics::World;
use crate::sim::render::{Frame, RenderBridge, RenderItem};
use crate::sim::telemetry::TelemetryLog;
use std::time::Instant;
use tracing::{debug, info};

/// Monotonic time source in seconds.
pub trait Clock {
    fn now(&mut self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    start: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for WallClock {
    fn now(&mut self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Advances by a fixed increment on every reading.
#[derive(Debug, Clone, Copy)]
pub struct ManualClock {
    time: f64,
    increment: f64,
}

impl ManualClock {
    pub fn new(increment: f64) -> Self {
        Self {
            time: 0.0,
            increment,
        }
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> f64 {
        self.time += self.increment;
        self.time
    }
}

/// Running until a close request is seen, then Closed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub steps: u64,
    pub sim_time: f64,
}

pub struct FrameLoop<C: Clock = WallClock> {
    world: World,
    items: Vec<RenderItem>,
    policy: TimestepPolicy,
    clock: C,
    last: f64,
    accumulator: f64,
    state: LoopState,
    frames: u64,
    steps: u64,
    telemetry: Option<TelemetryLog>,
}

impl FrameLoop<WallClock> {
    pub fn new(world: World, items: Vec<RenderItem>, policy: TimestepPolicy) -> Self {
        Self::with_clock(world, items, policy, WallClock::default())
    }
}

impl<C: Clock> FrameLoop<C> {
    pub fn with_clock(world: World, items: Vec<RenderItem>, policy: TimestepPolicy, mut clock: C) -> Self {
        let last = clock.now();
        Self {
            world,
            items,
            policy,
            clock,
            last,
            accumulator: 0.0,
            state: LoopState::Running,
            frames: 0,
            steps: 0,
            telemetry: None,
        }
    }

    /// Record every rendered pose sample.
    pub fn with_telemetry(mut self) -> Self {
        self.telemetry = Some(TelemetryLog::new());
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn telemetry(&self) -> Option<&TelemetryLog> {
        self.telemetry.as_ref()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frames,
            steps: self.steps,
            sim_time: self.world.time(),
        }
    }

    /// Poses of every non-scenery item as they stand now.
    pub fn capture_frame(&self) -> Frame {
        let samples = self
            .items
            .iter()
            .filter(|item| !item.scenery)
            .filter_map(|item| self.world.pose(item.body).map(|pose| item.sample(&pose)))
            .collect();
        Frame {
            index: self.frames,
            sim_time: self.world.time(),
            samples,
        }
    }

    /// One loop iteration. Once closed, further ticks do nothing.
    pub fn tick<B: RenderBridge + ?Sized>(&mut self, bridge: &mut B) -> Result<LoopState, LoopError> {
        if self.state == LoopState::Closed {
            return Ok(LoopState::Closed);
        }
        if bridge.close_requested() {
            info!(frames = self.frames, time = self.world.time(), "close requested");
            self.state = LoopState::Closed;
            return Ok(LoopState::Closed);
        }

        let frame = self.capture_frame();
        bridge.present(&frame)?;
        if let Some(log) = self.telemetry.as_mut() {
            log.record(&frame);
        }
        self.frames += 1;

        let now = self.clock.now();
        let dt = now - self.last;
        self.last = now;
        self.advance(dt)?;
        Ok(LoopState::Running)
    }

    fn advance(&mut self, dt: f64) -> Result<(), LoopError> {
        match self.policy {
            TimestepPolicy::WallClock => {
                self.world.step(dt)?;
                self.steps += 1;
            }
            TimestepPolicy::Fixed {
                tick,
                max_steps_per_frame,
            } => {
                self.accumulator += dt.max(0.0);
                let mut taken = 0;
                while self.accumulator >= tick && taken < max_steps_per_frame {
                    self.world.step(tick)?;
                    self.accumulator -= tick;
                    self.steps += 1;
                    taken += 1;
                }
                if self.accumulator >= tick {
                    let dropped = (self.accumulator / tick).floor();
                    self.accumulator -= dropped * tick;
                    debug!(dropped, frame = self.frames, "frame fell behind, dropping fixed ticks");
                }
            }
        }
        Ok(())
    }

    /// Build the render pipeline and restart the clock. A failure here is
    /// returned before any frame is drawn.
    pub fn start<B: RenderBridge + ?Sized>(&mut self, bridge: &mut B) -> Result<(), LoopError> {
        bridge.prepare(&self.items)?;
        info!(
            items = self.items.len(),
            policy = ?self.policy,
            integrator = self.world.integrator_name(),
            "frame loop started"
        );
        self.last = self.clock.now();
        Ok(())
    }

    pub fn finish(&self) -> RunSummary {
        let summary = self.summary();
        info!(
            frames = summary.frames,
            steps = summary.steps,
            sim_time = summary.sim_time,
            "frame loop finished"
        );
        summary
    }

    /// Prepare the renderer, then tick until closed.
    pub fn run<B: RenderBridge + ?Sized>(&mut self, bridge: &mut B) -> Result<RunSummary, LoopError> {
        self.start(bridge)?;
        while self.tick(bridge)? == LoopState::Running {}
        Ok(self.finish())
    }
}
