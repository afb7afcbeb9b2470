//! Posing the node hierarchy.
//!
//! Mesh geometry is baked at the rest pose, so a mesh is drawn with
//! `group * world_now(node) * world_rest(node)⁻¹`. At rest that product is
//! the group transform alone.

use glam::Mat4;

use super::animation::AnimationClip;
use super::graph::{world_matrices, SceneGraph, SceneNode, TransformStep};
use super::kinematics::Kinematics;

pub struct Rig {
    nodes: Vec<SceneNode>,
    rest_inverse: Vec<Mat4>,
    mesh_nodes: Vec<Option<usize>>,
}

impl Rig {
    pub fn new(graph: &SceneGraph) -> Self {
        let rest_steps: Vec<&[TransformStep]> = graph.nodes.iter().map(|n| n.steps.as_slice()).collect();
        let rest_inverse = world_matrices(&graph.nodes, &rest_steps)
            .into_iter()
            .map(|world| {
                if world.determinant().abs() > f32::EPSILON {
                    world.inverse()
                } else {
                    Mat4::IDENTITY
                }
            })
            .collect();

        Self {
            nodes: graph.nodes.clone(),
            rest_inverse,
            mesh_nodes: graph
                .meshes
                .iter()
                .map(|m| m.node.filter(|n| *n < graph.nodes.len()))
                .collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// One matrix per mesh, in graph order, with `group` applied.
    /// `clip` is the playing clip and its playhead.
    pub fn mesh_matrices(
        &self,
        group: Mat4,
        clip: Option<(&AnimationClip, f32)>,
        kinematics: Option<&Kinematics>,
    ) -> Vec<Mat4> {
        let animated = clip.is_some_and(|(c, _)| !c.channels.is_empty());
        let articulated = kinematics.is_some_and(|k| k.joints().any(|j| j.target().is_some()));
        if self.nodes.is_empty() || !(animated || articulated) {
            return vec![group; self.mesh_nodes.len()];
        }

        let mut steps: Vec<Vec<TransformStep>> = self.nodes.iter().map(|n| n.steps.clone()).collect();

        if let Some((clip, time)) = clip {
            for channel in &clip.channels {
                let target = channel.target;
                if let Some(step) = steps.get_mut(target.node).and_then(|s| s.get_mut(target.step)) {
                    *step = channel.sample(time, step);
                }
            }
        }

        // Joints win over animation on the same step
        for joint in kinematics.into_iter().flat_map(|k| k.joints()) {
            let Some(target) = joint.target() else {
                continue;
            };
            if joint.is_static() {
                continue;
            }
            if let Some(step) = steps.get_mut(target.node).and_then(|s| s.get_mut(target.step)) {
                *step = joint.motion();
            }
        }

        let world = world_matrices(&self.nodes, &steps);
        self.mesh_nodes
            .iter()
            .map(|node| match node {
                Some(i) => group * world[*i] * self.rest_inverse[*i],
                None => group,
            })
            .collect()
    }
}
