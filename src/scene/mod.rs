//! The loaded scene and its mutation surface.
//!
//! [`SceneAdapter`] is the only way bindings and the render loop touch the
//! scene. [`ModelScene`] implements it for every model format; drawing is
//! delegated to a [`FrameRenderer`] so the scene itself needs no GPU.

pub mod animation;
pub mod graph;
pub mod kinematics;
pub mod orbit;
pub mod rig;

use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::config::DisplaySettings;
use crate::error::{JointError, LoadError};
use crate::property::Axis;

use animation::AnimationMixer;
use graph::{SceneGraph, Transform};
use kinematics::Kinematics;
use orbit::OrbitCamera;
use rig::Rig;

/// Mutation surface of a loaded scene.
pub trait SceneAdapter {
    fn set_position(&mut self, axis: Axis, value: f32);
    fn set_rotation(&mut self, axis: Axis, value: f32);
    /// Uniform scale on all three axes.
    fn set_scale(&mut self, value: f32);
    /// Sets the mixer time scale. Returns false when the model has no mixer.
    fn set_animation_speed(&mut self, value: f32) -> bool;
    fn set_orbit_speed(&mut self, value: f32);
    fn set_joint_value(&mut self, name: &str, value: f32) -> Result<(), JointError>;

    /// Advance animation and orbit time.
    fn advance(&mut self, delta: f32);
    /// Draw one frame with the current camera state.
    fn render(&mut self);
    /// Update the viewport and render immediately.
    fn resize(&mut self, width: u32, height: u32);

    fn snapshot(&self) -> SceneSnapshot;
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub view_proj: Mat4,
    /// Group transform.
    pub model: Mat4,
    /// Per-mesh model matrices in [`SceneGraph::meshes`] order, with the
    /// group transform and the current pose applied.
    pub mesh_matrices: Vec<Mat4>,
    pub camera_position: Vec3,
    pub background: [f32; 3],
    pub show_grid: bool,
    pub frame_index: u64,
}

/// Draws frames for a [`ModelScene`].
pub trait FrameRenderer {
    /// Upload the model geometry. Called once per loaded model.
    fn prepare(&mut self, graph: &SceneGraph) -> Result<(), LoadError>;
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    fn render(&mut self, frame: &FrameState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSnapshot {
    pub clip: String,
    pub time: f32,
    pub time_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointSnapshot {
    pub name: String,
    pub value: f32,
}

/// Observable scene state, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub orbit_speed: f32,
    pub camera_position: [f32; 3],
    pub animation: Option<AnimationSnapshot>,
    pub joints: Vec<JointSnapshot>,
    pub viewport: (u32, u32),
    pub frames_rendered: u64,
}

/// A model scene shared by all formats.
pub struct ModelScene {
    graph: SceneGraph,
    rig: Rig,
    transform: Transform,
    mixer: Option<AnimationMixer>,
    kinematics: Option<Kinematics>,
    camera: OrbitCamera,
    display: DisplaySettings,
    renderer: Box<dyn FrameRenderer>,
    frames_rendered: u64,
}

impl ModelScene {
    pub fn new(
        mut graph: SceneGraph,
        display: DisplaySettings,
        mut renderer: Box<dyn FrameRenderer>,
    ) -> Result<Self, LoadError> {
        renderer.prepare(&graph)?;

        let (width, height) = renderer.size();
        let mixer = AnimationMixer::new(graph.animations.clone());
        let kinematics = graph.kinematics.take();
        if let Some(k) = &kinematics {
            log::info!(
                "Model exposes {} joints ({} drivable, {} bound to nodes)",
                k.len(),
                k.joints().filter(|j| !j.is_static()).count(),
                k.joints().filter(|j| j.target().is_some()).count()
            );
        }
        let rig = Rig::new(&graph);

        Ok(Self {
            graph,
            rig,
            transform: Transform::default(),
            mixer,
            kinematics,
            camera: OrbitCamera::new(aspect_ratio(width, height)),
            display,
            renderer,
            frames_rendered: 0,
        })
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn kinematics(&self) -> Option<&Kinematics> {
        self.kinematics.as_ref()
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Model matrix of every mesh for the current pose.
    pub fn mesh_matrices(&self) -> Vec<Mat4> {
        let clip = self.mixer.as_ref().map(|m| (m.active_clip(), m.time()));
        self.rig
            .mesh_matrices(self.transform.matrix(), clip, self.kinematics.as_ref())
    }

    fn frame_state(&self) -> FrameState {
        FrameState {
            view_proj: self.camera.view_projection_matrix(),
            model: self.transform.matrix(),
            mesh_matrices: self.mesh_matrices(),
            camera_position: self.camera.position(),
            background: self.display.background_rgb(),
            show_grid: self.display.show_grid,
            frame_index: self.frames_rendered,
        }
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

fn set_axis(v: &mut Vec3, axis: Axis, value: f32) {
    match axis {
        Axis::X => v.x = value,
        Axis::Y => v.y = value,
        Axis::Z => v.z = value,
    }
}

impl SceneAdapter for ModelScene {
    fn set_position(&mut self, axis: Axis, value: f32) {
        set_axis(&mut self.transform.position, axis, value);
    }

    fn set_rotation(&mut self, axis: Axis, value: f32) {
        set_axis(&mut self.transform.rotation, axis, value);
    }

    fn set_scale(&mut self, value: f32) {
        self.transform.scale = Vec3::splat(value);
    }

    fn set_animation_speed(&mut self, value: f32) -> bool {
        match self.mixer.as_mut() {
            Some(mixer) => {
                mixer.set_time_scale(value);
                true
            }
            None => false,
        }
    }

    fn set_orbit_speed(&mut self, value: f32) {
        self.camera.set_speed(value);
    }

    fn set_joint_value(&mut self, name: &str, value: f32) -> Result<(), JointError> {
        match self.kinematics.as_mut() {
            Some(kinematics) => kinematics.set_joint_value(name, value),
            None => Err(JointError::NotFound(name.to_string())),
        }
    }

    fn advance(&mut self, delta: f32) {
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.update(delta);
        }
        self.camera.advance(delta);
    }

    fn render(&mut self) {
        let frame = self.frame_state();
        match self.renderer.render(&frame) {
            Ok(()) => self.frames_rendered += 1,
            Err(e) => log::error!("Frame {} failed to render: {:#}", frame.frame_index, e),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return;
        }
        self.renderer.resize(width, height);
        self.camera.set_aspect(aspect_ratio(width, height));
        self.render();
    }

    fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            position: self.transform.position.to_array(),
            rotation: self.transform.rotation.to_array(),
            scale: self.transform.scale.to_array(),
            orbit_speed: self.camera.speed(),
            camera_position: self.camera.position().to_array(),
            animation: self.mixer.as_ref().map(|m| AnimationSnapshot {
                clip: m.active_clip().name.clone(),
                time: m.time(),
                time_scale: m.time_scale(),
            }),
            joints: self
                .kinematics
                .iter()
                .flat_map(|k| k.joints())
                .map(|j| JointSnapshot {
                    name: j.name().to_string(),
                    value: j.value(),
                })
                .collect(),
            viewport: self.renderer.size(),
            frames_rendered: self.frames_rendered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mesh::Vertex;
    use animation::{AnimationClip, Channel, Interpolation, Keyframes};
    use graph::{ModelMesh, SceneNode, StepTarget, TransformStep};
    use kinematics::{Joint, JointKind, JointLimits};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct NullRenderer {
        size: (u32, u32),
        renders: Rc<Cell<u32>>,
        last_meshes: Rc<RefCell<Vec<Mat4>>>,
    }

    impl FrameRenderer for NullRenderer {
        fn prepare(&mut self, _graph: &SceneGraph) -> Result<(), LoadError> {
            Ok(())
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
        }

        fn size(&self) -> (u32, u32) {
            self.size
        }

        fn render(&mut self, frame: &FrameState) -> anyhow::Result<()> {
            self.renders.set(self.renders.get() + 1);
            *self.last_meshes.borrow_mut() = frame.mesh_matrices.clone();
            Ok(())
        }
    }

    fn scene(graph: SceneGraph) -> (ModelScene, Rc<Cell<u32>>) {
        let (scene, renders, _) = scene_with_frames(graph);
        (scene, renders)
    }

    fn scene_with_frames(graph: SceneGraph) -> (ModelScene, Rc<Cell<u32>>, Rc<RefCell<Vec<Mat4>>>) {
        let renders = Rc::new(Cell::new(0));
        let last_meshes = Rc::new(RefCell::new(Vec::new()));
        let renderer = NullRenderer {
            size: (800, 600),
            renders: Rc::clone(&renders),
            last_meshes: Rc::clone(&last_meshes),
        };
        let scene = ModelScene::new(graph, DisplaySettings::default(), Box::new(renderer)).unwrap();
        (scene, renders, last_meshes)
    }

    // The triangle hung from a node that a joint rotates about Z
    fn jointed_triangle() -> SceneGraph {
        let mut graph = triangle();
        graph.meshes[0].node = Some(0);
        graph.nodes = vec![SceneNode::new("link", None, vec![TransformStep::AxisAngle(Vec3::Z, 0.0)])];
        graph.kinematics = Some(Kinematics::new(vec![Joint::new(
            "elbow",
            JointKind::Revolute,
            [0.0, 0.0, 1.0],
            JointLimits { min: -180.0, max: 180.0 },
        )
        .with_target(StepTarget { node: 0, step: 0 })]));
        graph
    }

    fn triangle() -> SceneGraph {
        SceneGraph {
            meshes: vec![ModelMesh::new(
                "tri",
                vec![
                    Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0; 3]),
                    Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0; 3]),
                    Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0; 3]),
                ],
                vec![0, 1, 2],
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_transform_setters() {
        let (mut scene, _) = scene(triangle());
        scene.set_position(Axis::Y, 2.0);
        scene.set_rotation(Axis::Z, 0.5);
        scene.set_scale(3.0);

        let snapshot = scene.snapshot();
        assert_eq!(snapshot.position, [0.0, 2.0, 0.0]);
        assert_eq!(snapshot.rotation, [0.0, 0.0, 0.5]);
        assert_eq!(snapshot.scale, [3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_animation_speed_without_mixer() {
        let (mut scene, _) = scene(triangle());
        assert!(!scene.set_animation_speed(2.0));
        assert!(scene.snapshot().animation.is_none());
    }

    #[test]
    fn test_advance_drives_mixer_and_orbit() {
        let mut graph = triangle();
        graph.animations.push(AnimationClip::new("spin", 4.0));
        let (mut scene, _) = scene(graph);

        assert!(scene.set_animation_speed(0.5));
        scene.set_orbit_speed(1.0);
        scene.advance(2.0);

        let animation = scene.snapshot().animation.unwrap();
        assert_eq!(animation.clip, "spin");
        assert!((animation.time - 1.0).abs() < 1e-6);
        assert_eq!(scene.camera().elapsed(), 2.0);
    }

    #[test]
    fn test_joints_without_kinematics() {
        let (mut scene, _) = scene(triangle());
        assert_eq!(
            scene.set_joint_value("elbow", 1.0),
            Err(JointError::NotFound("elbow".to_string()))
        );
    }

    #[test]
    fn test_joint_setter_reaches_kinematics() {
        let mut graph = triangle();
        graph.kinematics = Some(Kinematics::new(vec![Joint::new(
            "elbow",
            JointKind::Revolute,
            [0.0, 0.0, 1.0],
            JointLimits { min: -10.0, max: 10.0 },
        )]));
        let (mut scene, _) = scene(graph);

        scene.set_joint_value("elbow", 5.0).unwrap();
        assert_eq!(scene.snapshot().joints[0].value, 5.0);
    }

    #[test]
    fn test_joint_value_reaches_rendered_frame() {
        let (mut scene, _, last_meshes) = scene_with_frames(jointed_triangle());
        scene.set_scale(2.0);
        scene.set_joint_value("elbow", 90.0).unwrap();
        scene.render();

        let matrices = last_meshes.borrow();
        assert_eq!(matrices.len(), 1);
        let p = matrices[0].transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5, "{:?}", p);
    }

    #[test]
    fn test_animation_speed_changes_rendered_pose() {
        let mut graph = triangle();
        graph.meshes[0].node = Some(0);
        graph.nodes = vec![SceneNode::new("slider", None, vec![TransformStep::Translate(Vec3::ZERO)])];
        graph.animations.push(AnimationClip::new("slide", 4.0).with_channels(vec![Channel {
            target: StepTarget { node: 0, step: 0 },
            times: vec![0.0, 4.0],
            keyframes: Keyframes::Translations(vec![Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0)]),
            interpolation: Interpolation::Linear,
        }]));
        let (mut scene, _, last_meshes) = scene_with_frames(graph);

        scene.set_animation_speed(2.0);
        scene.advance(1.0);
        scene.render();

        let p = last_meshes.borrow()[0].transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5, "{:?}", p);
    }

    #[test]
    fn test_resize_renders_immediately() {
        let (mut scene, renders) = scene(triangle());

        scene.resize(400, 200);
        assert_eq!(renders.get(), 1);
        assert_eq!(scene.snapshot().viewport, (400, 200));
        assert_eq!(scene.camera().aspect(), 2.0);

        scene.resize(0, 200);
        assert_eq!(renders.get(), 1);
        assert_eq!(scene.snapshot().viewport, (400, 200));
    }

    #[test]
    fn test_render_counts_frames() {
        let (mut scene, renders) = scene(triangle());
        scene.render();
        scene.render();
        assert_eq!(renders.get(), 2);
        assert_eq!(scene.frames_rendered(), 2);
    }
}
