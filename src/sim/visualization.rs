//! Windowed `RenderBridge` on top of bevy.
//!
//! bevy owns the event loop, so the frame loop is ticked from an `Update`
//! system instead of `FrameLoop::run`.

use crate::config::WindowConfig;
use crate::error::{LoopError, RenderError};
use crate::sim::frame_loop::{FrameLoop, RunSummary};
use crate::sim::mesh::Mesh as SimMesh;
use crate::sim::render::{Frame, RenderBridge, RenderItem};

#[cfg(feature = "visualization")]
use bevy::prelude::*;

/// Bridge state shared between the frame loop and the bevy systems.
#[derive(Debug, Default)]
pub struct WindowBridge {
    pending: Vec<(RenderItem, SimMesh)>,
    latest: Option<Frame>,
    close: bool,
}

impl WindowBridge {
    pub fn request_close(&mut self) {
        self.close = true;
    }

    pub fn take_pending(&mut self) -> Vec<(RenderItem, SimMesh)> {
        std::mem::take(&mut self.pending)
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }
}

impl RenderBridge for WindowBridge {
    fn prepare(&mut self, items: &[RenderItem]) -> Result<(), RenderError> {
        self.pending = items
            .iter()
            .map(|item| Ok((item.clone(), SimMesh::build(item.label.clone(), &item.mesh)?)))
            .collect::<Result<_, RenderError>>()?;
        Ok(())
    }

    fn present(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.latest = Some(frame.clone());
        Ok(())
    }

    fn close_requested(&self) -> bool {
        self.close
    }
}

pub struct Visualization;

impl Visualization {
    /// Open a window and run `frame_loop` until it is closed.
    #[cfg(feature = "visualization")]
    pub fn run(frame_loop: FrameLoop, window: &WindowConfig) -> Result<RunSummary, LoopError> {
        run_app(frame_loop, window)
    }

    #[cfg(not(feature = "visualization"))]
    pub fn run(_frame_loop: FrameLoop, _window: &WindowConfig) -> Result<RunSummary, LoopError> {
        Err(LoopError::Render(RenderError::Backend(
            "built without the `visualization` feature".to_string(),
        )))
    }
}

#[cfg(feature = "visualization")]
mod app {
    use super::*;
    use bevy::render::mesh::{Indices, PrimitiveTopology};
    use bevy::render::render_asset::RenderAssetUsages;
    use bevy::window::WindowCloseRequested;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    pub(super) type Outcome = Arc<Mutex<Option<Result<RunSummary, LoopError>>>>;

    #[derive(Resource)]
    pub(super) struct SimResource {
        pub frame_loop: FrameLoop,
        pub bridge: WindowBridge,
        pub outcome: Outcome,
    }

    #[derive(Component)]
    pub(super) struct BodyEntity(pub crate::physics::BodyId);

    fn to_bevy_mesh(mesh: &SimMesh) -> Mesh {
        let positions: Vec<[f32; 3]> = mesh.vertices.iter().map(|v| v.position).collect();
        let normals: Vec<[f32; 3]> = mesh.vertices.iter().map(|v| v.normal).collect();
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
            .with_inserted_indices(Indices::U32(mesh.indices.clone()))
    }

    pub(super) fn setup_scene(
        mut commands: Commands,
        mut sim: ResMut<SimResource>,
        mut meshes: ResMut<Assets<Mesh>>,
        mut materials: ResMut<Assets<StandardMaterial>>,
    ) {
        let initial: HashMap<_, _> = sim
            .frame_loop
            .world()
            .bodies()
            .iter()
            .map(|b| (b.id(), b.pose()))
            .collect();

        for (item, mesh) in sim.bridge.take_pending() {
            let color = if item.scenery {
                Color::srgb(0.3, 0.6, 0.3)
            } else {
                Color::srgb(0.9, 0.9, 0.9)
            };
            let mut transform = Transform::IDENTITY;
            if let Some(pose) = initial.get(&item.body) {
                let sample = item.sample(pose);
                transform = pose_transform(&sample.position, &sample.rotation);
            }
            commands.spawn((
                PbrBundle {
                    mesh: meshes.add(to_bevy_mesh(&mesh)),
                    material: materials.add(StandardMaterial {
                        base_color: color,
                        ..default()
                    }),
                    transform,
                    ..default()
                },
                BodyEntity(item.body),
            ));
        }

        commands.spawn(DirectionalLightBundle {
            directional_light: DirectionalLight {
                shadows_enabled: true,
                ..default()
            },
            transform: Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.8, -0.4, 0.0)),
            ..default()
        });

        commands.spawn(Camera3dBundle {
            transform: Transform::from_translation(Vec3::new(0.0, 0.4, 3.0))
                .looking_at(Vec3::ZERO, Vec3::Y),
            ..default()
        });
    }

    fn pose_transform(position: &[f32; 3], rotation: &[f32; 9]) -> Transform {
        Transform {
            translation: Vec3::from_array(*position),
            rotation: Quat::from_mat3(&Mat3::from_cols_array(rotation)),
            ..default()
        }
    }

    pub(super) fn handle_input(
        keys: Res<ButtonInput<KeyCode>>,
        mut close_events: EventReader<WindowCloseRequested>,
        mut sim: ResMut<SimResource>,
    ) {
        let window_closed = close_events.read().count() > 0;
        if window_closed || keys.just_pressed(KeyCode::Escape) {
            sim.bridge.request_close();
        }
    }

    pub(super) fn advance(mut sim: ResMut<SimResource>, mut exit: EventWriter<AppExit>) {
        let SimResource {
            frame_loop,
            bridge,
            outcome,
        } = &mut *sim;
        if outcome.lock().map(|slot| slot.is_some()).unwrap_or(true) {
            return;
        }
        let result = match frame_loop.tick(bridge) {
            Ok(crate::sim::frame_loop::LoopState::Running) => return,
            Ok(crate::sim::frame_loop::LoopState::Closed) => Ok(frame_loop.finish()),
            Err(e) => {
                tracing::error!(error = %e, "frame loop failed");
                Err(e)
            }
        };
        let code = if result.is_ok() {
            AppExit::Success
        } else {
            AppExit::error()
        };
        if let Ok(mut slot) = outcome.lock() {
            *slot = Some(result);
        }
        exit.send(code);
    }

    pub(super) fn apply_poses(sim: Res<SimResource>, mut query: Query<(&BodyEntity, &mut Transform)>) {
        let Some(frame) = sim.bridge.latest() else {
            return;
        };
        for (entity, mut transform) in query.iter_mut() {
            if let Some(sample) = frame.samples.iter().find(|s| s.body == entity.0) {
                *transform = pose_transform(&sample.position, &sample.rotation);
            }
        }
    }
}

#[cfg(feature = "visualization")]
fn run_app(mut frame_loop: FrameLoop, window: &WindowConfig) -> Result<RunSummary, LoopError> {
    use std::sync::{Arc, Mutex};

    let mut bridge = WindowBridge::default();
    frame_loop.start(&mut bridge)?;

    let outcome: app::Outcome = Arc::new(Mutex::new(None));
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: window.title_or_default().to_string(),
                resolution: (window.width as f32, window.height as f32).into(),
                ..default()
            }),
            // The loop decides when to close.
            close_when_requested: false,
            ..default()
        }))
        .insert_resource(app::SimResource {
            frame_loop,
            bridge,
            outcome: outcome.clone(),
        })
        .add_systems(Startup, app::setup_scene)
        .add_systems(Update, (app::handle_input, app::advance, app::apply_poses).chain())
        .run();

    let result = outcome.lock().ok().and_then(|mut slot| slot.take());
    result.unwrap_or_else(|| {
        Err(LoopError::Render(RenderError::Backend(
            "window closed without a loop result".to_string(),
        )))
    })
}
