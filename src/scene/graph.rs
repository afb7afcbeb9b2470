//! Parsed model geometry.
//!
//! Loaders flatten every format into a list of [`ModelMesh`]es in model
//! space, baked at the rest pose. The scene applies one group
//! [`Transform`] on top of them.
//!
//! Loaders that know the node hierarchy also record it as [`SceneNode`]s
//! and tag each mesh with the node it hangs from, so animation channels
//! and joints can move parts of the model after loading.
//!
//! ## Normal Handling
//!
//! Meshes use provided normals when available. Normals are generated only
//! when missing, using area-weighted averaging of adjacent face normals.

use glam::{EulerRot, Mat4, Quat, Vec3};

use super::animation::AnimationClip;
use super::kinematics::Kinematics;
use crate::constants::MODEL_COLOR;
use crate::gpu::mesh::Vertex;

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Compute bounding box from a set of vertices.
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        for v in vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }

        Self { min, max }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> Self {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Position, Euler rotation (radians, XYZ order) and per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// One element of a node's local transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStep {
    Translate(Vec3),
    Rotate(Quat),
    /// Normalized axis and angle in radians.
    AxisAngle(Vec3, f32),
    Scale(Vec3),
    Matrix(Mat4),
}

impl TransformStep {
    pub fn matrix(&self) -> Mat4 {
        match *self {
            TransformStep::Translate(t) => Mat4::from_translation(t),
            TransformStep::Rotate(q) => Mat4::from_quat(q),
            TransformStep::AxisAngle(axis, angle) => Mat4::from_axis_angle(axis, angle),
            TransformStep::Scale(s) => Mat4::from_scale(s),
            TransformStep::Matrix(m) => m,
        }
    }
}

/// Product of `steps`, in order.
pub fn steps_matrix(steps: &[TransformStep]) -> Mat4 {
    steps.iter().fold(Mat4::IDENTITY, |acc, step| acc * step.matrix())
}

/// A node of the model hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Always an earlier index than the node itself.
    pub parent: Option<usize>,
    /// Rest-pose local transform.
    pub steps: Vec<TransformStep>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, parent: Option<usize>, steps: Vec<TransformStep>) -> Self {
        Self {
            name: name.into(),
            parent,
            steps,
        }
    }
}

/// One transform step of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepTarget {
    pub node: usize,
    pub step: usize,
}

/// World matrices for `nodes` with the given per-node steps.
pub fn world_matrices<S: AsRef<[TransformStep]>>(nodes: &[SceneNode], steps: &[S]) -> Vec<Mat4> {
    let mut world: Vec<Mat4> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let local = steps.get(i).map_or(Mat4::IDENTITY, |s| steps_matrix(s.as_ref()));
        let matrix = match node.parent {
            Some(p) if p < i => world[p] * local,
            _ => local,
        };
        world.push(matrix);
    }
    world
}

/// One drawable mesh with geometry ready for upload.
#[derive(Debug, Clone)]
pub struct ModelMesh {
    pub name: String,
    /// Vertex data (position + normal + color).
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
    pub bounds: BoundingBox,
    /// Index into [`SceneGraph::nodes`] of the node carrying this mesh.
    pub node: Option<usize>,
}

impl ModelMesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bounds = BoundingBox::from_vertices(&vertices);
        Self {
            name: name.into(),
            vertices,
            indices,
            bounds,
            node: None,
        }
    }

    pub fn with_node(mut self, node: usize) -> Self {
        self.node = Some(node);
        self
    }

    /// Build a mesh from raw attribute streams.
    ///
    /// `normals` is used only when it has one entry per position. A missing
    /// `color` falls back to the default model colour.
    pub fn from_attributes(
        name: impl Into<String>,
        positions: &[[f32; 3]],
        normals: Option<&[[f32; 3]]>,
        color: Option<[f32; 3]>,
        indices: Vec<u32>,
    ) -> Self {
        let generated;
        let normals = match normals {
            Some(n) if n.len() == positions.len() => n,
            _ => {
                generated = compute_vertex_normals(positions, &indices);
                generated.as_slice()
            }
        };
        let color = color.unwrap_or(MODEL_COLOR);

        let vertices = positions
            .iter()
            .zip(normals.iter())
            .map(|(position, normal)| Vertex::new(*position, *normal, color))
            .collect();

        Self::new(name, vertices, indices)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Everything a loader extracts from a model file.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub meshes: Vec<ModelMesh>,
    /// Parents before children. Empty for formats without a hierarchy.
    pub nodes: Vec<SceneNode>,
    pub animations: Vec<AnimationClip>,
    pub kinematics: Option<Kinematics>,
}

impl SceneGraph {
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(ModelMesh::triangle_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Bounds over all meshes, or `None` for an empty graph.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.meshes
            .iter()
            .filter(|m| !m.vertices.is_empty())
            .map(|m| m.bounds)
            .reduce(|a, b| a.union(&b))
    }
}

/// Compute area-weighted vertex normals from face normals.
///
/// For each vertex, accumulates the (unnormalized) face normal of each
/// adjacent triangle, then normalizes.
pub fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = Vec3::from(positions[i0]);
        let p1 = Vec3::from(positions[i1]);
        let p2 = Vec3::from(positions[i2]);

        // Magnitude is twice the triangle area
        let face_normal = (p1 - p0).cross(p2 - p0);
        for idx in [i0, i1, i2] {
            normals[idx] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.length() > 1e-6 {
                n.normalize().to_array()
            } else {
                // Degenerate normal, use Y-up as fallback
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_vertices() {
        let vertices = vec![
            Vertex::new([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0; 3]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0; 3]),
            Vertex::new([0.0, 2.0, 0.0], [0.0, 1.0, 0.0], [1.0; 3]),
        ];

        let bounds = BoundingBox::from_vertices(&vertices);
        assert_eq!(bounds.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 2.0, 0.0]);
        assert_eq!(bounds.center(), [0.0, 1.0, 0.0]);
        assert_eq!(bounds.size(), [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_generated_normals_face_up() {
        // Counter-clockwise in XZ seen from +Y
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]];
        let normals = compute_vertex_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert!((n[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mismatched_normals_are_regenerated() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let wrong = [[1.0, 0.0, 0.0]];
        let mesh = ModelMesh::from_attributes("m", &positions, Some(&wrong), None, vec![0, 1, 2]);

        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[0].color, MODEL_COLOR);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_transform_matrix_applies_scale_then_translation() {
        let transform = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: Vec3::ZERO,
            scale: Vec3::splat(2.0),
        };
        let p = transform.matrix().transform_point3(Vec3::new(1.0, 1.0, 1.0));
        assert!((p - Vec3::new(3.0, 2.0, 2.0)).length() < 1e-6);
    }

    #[test]
    fn test_world_matrices_follow_parents() {
        let nodes = vec![
            SceneNode::new("root", None, vec![TransformStep::Translate(Vec3::new(0.0, 2.0, 0.0))]),
            SceneNode::new(
                "arm",
                Some(0),
                vec![
                    TransformStep::AxisAngle(Vec3::Z, std::f32::consts::FRAC_PI_2),
                    TransformStep::Scale(Vec3::splat(2.0)),
                ],
            ),
        ];
        let steps: Vec<&[TransformStep]> = nodes.iter().map(|n| n.steps.as_slice()).collect();
        let world = world_matrices(&nodes, &steps);

        let p = world[1].transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 4.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_scene_graph_bounds() {
        let a = ModelMesh::new(
            "a",
            vec![Vertex::new([-1.0, 0.0, 0.0], [0.0; 3], [1.0; 3])],
            vec![],
        );
        let b = ModelMesh::new(
            "b",
            vec![Vertex::new([0.0, 3.0, 2.0], [0.0; 3], [1.0; 3])],
            vec![],
        );
        let graph = SceneGraph {
            meshes: vec![a, b],
            ..Default::default()
        };

        let bounds = graph.bounds().unwrap();
        assert_eq!(bounds.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [0.0, 3.0, 2.0]);
        assert!(SceneGraph::default().bounds().is_none());
        assert!(SceneGraph::default().is_empty());
    }
}
