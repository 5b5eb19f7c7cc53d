use approx::assert_relative_eq;
use mechsim::config::TimestepPolicy;
use mechsim::error::{LoopError, RenderError};
use mechsim::math::Vec3;
use mechsim::physics::{BodyDesc, BodyId, World};
use mechsim::sim::{
    Frame, FrameLoop, HeadlessRenderer, LoopState, ManualClock, MeshKind, RenderBridge, RenderItem,
};

fn falling_ball() -> (World, Vec<RenderItem>, BodyId) {
    let mut world = World::new().with_gravity(Vec3::new(0.0, -1.0, 0.0)).unwrap();
    let anchor = world.add_body(BodyDesc::point("anchor", 1.0).fixed()).unwrap();
    let ball = world
        .add_body(BodyDesc::point("ball", 1.0).at(Vec3::new(0.0, 1.0, 0.0)))
        .unwrap();
    let items = vec![
        RenderItem::new(anchor, "anchor", MeshKind::Point { size: 0.05 }).scenery(),
        RenderItem::new(ball, "ball", MeshKind::Point { size: 0.02 }),
    ];
    (world, items, ball)
}

/// Records every frame and closes on demand.
#[derive(Default)]
struct ScriptedBridge {
    frames: Vec<Frame>,
    close: bool,
    prepared: bool,
    fail_prepare: bool,
}

impl RenderBridge for ScriptedBridge {
    fn prepare(&mut self, _items: &[RenderItem]) -> Result<(), RenderError> {
        if self.fail_prepare {
            return Err(RenderError::Pipeline("shader failed to link".to_string()));
        }
        self.prepared = true;
        Ok(())
    }

    fn present(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn close_requested(&self) -> bool {
        self.close
    }
}

#[test]
fn frames_show_the_pose_before_the_step() {
    let (world, items, _) = falling_ball();
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25));
    let mut renderer = HeadlessRenderer::new(Some(3));

    let summary = frame_loop.run(&mut renderer).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.steps, 3);
    assert_relative_eq!(summary.sim_time, 0.75);
    let last = renderer.last_frame().unwrap();
    assert_eq!(last.index, 2);
    assert_relative_eq!(last.sim_time, 0.5);
}

#[test]
fn scenery_is_never_sampled() {
    let (world, items, ball) = falling_ball();
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25));
    let mut bridge = ScriptedBridge::default();
    frame_loop.start(&mut bridge).unwrap();
    frame_loop.tick(&mut bridge).unwrap();

    let frame = &bridge.frames[0];
    assert_eq!(frame.samples.len(), 1);
    assert_eq!(frame.samples[0].body, ball);
}

#[test]
fn close_is_one_way() {
    let (world, items, _) = falling_ball();
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25));
    let mut bridge = ScriptedBridge::default();
    frame_loop.start(&mut bridge).unwrap();

    assert_eq!(frame_loop.tick(&mut bridge).unwrap(), LoopState::Running);
    bridge.close = true;
    assert_eq!(frame_loop.tick(&mut bridge).unwrap(), LoopState::Closed);
    bridge.close = false;
    assert_eq!(frame_loop.tick(&mut bridge).unwrap(), LoopState::Closed);

    assert_eq!(frame_loop.frames(), 1);
    assert_eq!(bridge.frames.len(), 1);
    assert_relative_eq!(frame_loop.world().time(), 0.25);
}

#[test]
fn fixed_policy_steps_whole_ticks() {
    let (world, items, _) = falling_ball();
    let policy = TimestepPolicy::Fixed {
        tick: 0.125,
        max_steps_per_frame: 8,
    };
    let mut frame_loop = FrameLoop::with_clock(world, items, policy, ManualClock::new(0.5));
    let summary = frame_loop.run(&mut HeadlessRenderer::new(Some(4))).unwrap();

    assert_eq!(summary.steps, 16);
    assert_relative_eq!(summary.sim_time, 2.0);
}

#[test]
fn fixed_policy_drops_ticks_it_cannot_catch_up() {
    let (world, items, _) = falling_ball();
    let policy = TimestepPolicy::Fixed {
        tick: 0.25,
        max_steps_per_frame: 2,
    };
    let mut frame_loop = FrameLoop::with_clock(world, items, policy, ManualClock::new(1.0));
    let summary = frame_loop.run(&mut HeadlessRenderer::new(Some(3))).unwrap();

    // Each frame covers four ticks of wall time but only two are simulated.
    assert_eq!(summary.steps, 6);
    assert_relative_eq!(summary.sim_time, 1.5);
}

#[test]
fn prepare_failure_stops_before_the_first_frame() {
    let (world, items, _) = falling_ball();
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25));
    let mut bridge = ScriptedBridge {
        fail_prepare: true,
        ..ScriptedBridge::default()
    };

    let err = frame_loop.run(&mut bridge).unwrap_err();
    assert!(matches!(err, LoopError::Render(RenderError::Pipeline(_))));
    assert!(bridge.frames.is_empty());
    assert_eq!(frame_loop.world().time(), 0.0);
}

#[test]
fn invalid_mesh_is_reported_by_the_headless_renderer() {
    let (world, mut items, ball) = falling_ball();
    items.push(RenderItem::new(
        ball,
        "flat",
        MeshKind::Cylinder {
            radius: 0.1,
            length: 0.1,
            segments: 2,
        },
    ));
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25));
    let mut renderer = HeadlessRenderer::new(Some(10));

    let err = frame_loop.run(&mut renderer).unwrap_err();
    assert!(matches!(err, LoopError::Render(RenderError::InvalidMesh { .. })));
    assert_eq!(renderer.frames_presented(), 0);
}

#[test]
fn telemetry_tracks_every_drawn_body() {
    let (world, items, ball) = falling_ball();
    let mut frame_loop =
        FrameLoop::with_clock(world, items, TimestepPolicy::WallClock, ManualClock::new(0.25))
            .with_telemetry();
    frame_loop.run(&mut HeadlessRenderer::new(Some(5))).unwrap();

    let log = frame_loop.telemetry().unwrap();
    assert_eq!(log.len(), 5);
    let heights: Vec<f32> = log.body_track(ball).map(|r| r.position[1]).collect();
    assert_eq!(heights[0], 1.0);
    assert!(heights.windows(2).all(|w| w[1] < w[0]));

    let mut csv = Vec::new();
    log.write_csv(&mut csv).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert_eq!(text.lines().count(), 6);
    assert!(text.starts_with("frame,time,body,x,y,z"));
}
