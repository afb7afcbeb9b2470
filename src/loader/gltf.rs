//! glTF 2.0 loading (JSON with embedded or data-URI buffers, or GLB).
//!
//! Node transforms are baked into the vertices so every mesh ends up in
//! model space, and the node tree is kept alongside for animation.
//! Translation, rotation and scale channels are read; morph target weights
//! are not. Cubic spline samplers play back linearly through their
//! keyframe values. Clip durations come from the largest sampler input
//! time.

use std::collections::HashMap;

use ::gltf::animation::util::ReadOutputs;
use ::gltf::animation::Interpolation as SamplerInterpolation;
use ::gltf::mesh::Mode;
use ::gltf::{buffer, Document, Gltf, Node, Primitive};
use glam::{Mat3, Mat4, Quat, Vec3};

use super::ModelLoader;
use crate::error::LoadError;
use crate::scene::animation::{AnimationClip, Channel, Interpolation, Keyframes};
use crate::scene::graph::{ModelMesh, SceneGraph, SceneNode, StepTarget, TransformStep};

// Positions of the decomposed TRS steps of every node
const TRANSLATION_STEP: usize = 0;
const ROTATION_STEP: usize = 1;
const SCALE_STEP: usize = 2;

pub struct GltfLoader;

impl ModelLoader for GltfLoader {
    fn parse(&self, bytes: &[u8]) -> Result<SceneGraph, LoadError> {
        let Gltf { document, blob } =
            Gltf::from_slice(bytes).map_err(|e| LoadError::parse("GLTF", e.to_string()))?;
        let buffers = ::gltf::import_buffers(&document, None, blob)
            .map_err(|e| LoadError::parse("GLTF", e.to_string()))?;

        let mut hierarchy = Hierarchy::default();
        collect_meshes(&document, &buffers, &mut hierarchy);
        let animations = collect_clips(&document, &buffers, &hierarchy.node_map);

        Ok(SceneGraph {
            meshes: hierarchy.meshes,
            nodes: hierarchy.nodes,
            animations,
            kinematics: None,
        })
    }
}

#[derive(Default)]
struct Hierarchy {
    meshes: Vec<ModelMesh>,
    nodes: Vec<SceneNode>,
    /// glTF node index to index in `nodes`.
    node_map: HashMap<usize, usize>,
}

fn collect_meshes(document: &Document, buffers: &[buffer::Data], out: &mut Hierarchy) {
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                visit_node(&node, None, Mat4::IDENTITY, buffers, out);
            }
        }
        None => {
            // No scene: take every mesh untransformed
            for mesh in document.meshes() {
                let name = mesh_name(mesh.name(), mesh.index());
                for primitive in mesh.primitives() {
                    if let Some(m) = read_primitive(&name, &primitive, Mat4::IDENTITY, buffers) {
                        out.meshes.push(m);
                    }
                }
            }
        }
    }
}

fn visit_node(
    node: &Node,
    parent: Option<usize>,
    parent_world: Mat4,
    buffers: &[buffer::Data],
    out: &mut Hierarchy,
) {
    let world = parent_world * Mat4::from_cols_array_2d(&node.transform().matrix());

    let (translation, rotation, scale) = node.transform().decomposed();
    let index = out.nodes.len();
    out.nodes.push(SceneNode::new(
        node.name().map(str::to_string).unwrap_or_else(|| format!("Node_{}", node.index())),
        parent,
        vec![
            TransformStep::Translate(Vec3::from(translation)),
            TransformStep::Rotate(Quat::from_array(rotation)),
            TransformStep::Scale(Vec3::from(scale)),
        ],
    ));
    out.node_map.insert(node.index(), index);

    if let Some(mesh) = node.mesh() {
        let name = mesh_name(node.name().or(mesh.name()), mesh.index());
        for primitive in mesh.primitives() {
            if let Some(m) = read_primitive(&name, &primitive, world, buffers) {
                out.meshes.push(m.with_node(index));
            }
        }
    }

    for child in node.children() {
        visit_node(&child, Some(index), world, buffers, out);
    }
}

fn mesh_name(name: Option<&str>, index: usize) -> String {
    name.map(str::to_string)
        .unwrap_or_else(|| format!("Mesh_{}", index))
}

fn read_primitive(
    name: &str,
    primitive: &Primitive,
    world: Mat4,
    buffers: &[buffer::Data],
) -> Option<ModelMesh> {
    if primitive.mode() != Mode::Triangles {
        log::warn!("Skipping non-triangle primitive of mesh '{}'", name);
        return None;
    }

    let reader = primitive.reader(|b| buffers.get(b.index()).map(|data| &data.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()?
        .map(|p| world.transform_point3(Vec3::from(p)).to_array())
        .collect();
    if positions.is_empty() {
        return None;
    }

    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|normals| {
        normals
            .map(|n| (normal_matrix * Vec3::from(n)).normalize_or_zero().to_array())
            .collect()
    });

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let [r, g, b, _] = primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_factor();

    Some(ModelMesh::from_attributes(
        name,
        &positions,
        normals.as_deref(),
        Some([r, g, b]),
        indices,
    ))
}

fn collect_clips(
    document: &Document,
    buffers: &[buffer::Data],
    node_map: &HashMap<usize, usize>,
) -> Vec<AnimationClip> {
    document
        .animations()
        .map(|animation| {
            let duration = animation
                .channels()
                .filter_map(|channel| {
                    let reader = channel.reader(|b| buffers.get(b.index()).map(|data| &data.0[..]));
                    reader.read_inputs()?.reduce(f32::max)
                })
                .fold(0.0, f32::max);
            let name = animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Animation_{}", animation.index()));
            let channels = animation
                .channels()
                .filter_map(|channel| read_channel(&channel, buffers, node_map))
                .collect();
            AnimationClip::new(name, duration).with_channels(channels)
        })
        .collect()
}

fn read_channel(
    channel: &::gltf::animation::Channel<'_>,
    buffers: &[buffer::Data],
    node_map: &HashMap<usize, usize>,
) -> Option<Channel> {
    let target = channel.target();
    let Some(&node) = node_map.get(&target.node().index()) else {
        log::debug!("Channel targets node {} outside the scene; skipped", target.node().index());
        return None;
    };

    let reader = channel.reader(|b| buffers.get(b.index()).map(|data| &data.0[..]));
    let times: Vec<f32> = reader.read_inputs()?.collect();

    let spline = matches!(channel.sampler().interpolation(), SamplerInterpolation::CubicSpline);
    let interpolation = match channel.sampler().interpolation() {
        SamplerInterpolation::Step => Interpolation::Step,
        SamplerInterpolation::Linear | SamplerInterpolation::CubicSpline => Interpolation::Linear,
    };

    let (step, keyframes) = match reader.read_outputs()? {
        ReadOutputs::Translations(values) => (
            TRANSLATION_STEP,
            Keyframes::Translations(keyframe_values(values.map(Vec3::from).collect(), spline)),
        ),
        ReadOutputs::Rotations(values) => (
            ROTATION_STEP,
            Keyframes::Rotations(keyframe_values(
                values.into_f32().map(Quat::from_array).collect(),
                spline,
            )),
        ),
        ReadOutputs::Scales(values) => (
            SCALE_STEP,
            Keyframes::Scales(keyframe_values(values.map(Vec3::from).collect(), spline)),
        ),
        ReadOutputs::MorphTargetWeights(_) => {
            log::debug!("Morph target weight channels are not supported; skipped");
            return None;
        }
    };

    Some(Channel {
        target: StepTarget { node, step },
        times,
        keyframes,
        interpolation,
    })
}

/// Cubic spline outputs hold (in-tangent, value, out-tangent) per keyframe.
fn keyframe_values<T: Copy>(values: Vec<T>, spline: bool) -> Vec<T> {
    if spline {
        values.chunks_exact(3).map(|c| c[1]).collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::rig::Rig;

    // One triangle on a node translated by +1 X, with a 2 second clip.
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "tri", "mesh": 0, "translation": [1.0, 0.0, 0.0] }],
        "meshes": [{ "name": "Triangle", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "animations": [{
            "name": "slide",
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
            "samplers": [{ "input": 2, "output": 3, "interpolation": "LINEAR" }]
        }],
        "buffers": [{
            "byteLength": 76,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAAAAAAAAAAAQAAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAA=="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 52, "byteLength": 24 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0], "max": [2] },
            { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }
        ]
    }"#;

    #[test]
    fn test_gltf_triangle_with_clip() {
        let graph = GltfLoader.parse(TRIANGLE_GLTF.as_bytes()).unwrap();

        assert_eq!(graph.meshes.len(), 1);
        let mesh = &graph.meshes[0];
        assert_eq!(mesh.name, "tri");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[0].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[1].position, [2.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);

        assert!(graph.kinematics.is_none());

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(mesh.node, Some(0));

        assert_eq!(graph.animations.len(), 1);
        let clip = &graph.animations[0];
        assert_eq!((clip.name.as_str(), clip.duration), ("slide", 2.0));
        assert_eq!(clip.channels.len(), 1);
        assert_eq!(clip.channels[0].target, StepTarget { node: 0, step: TRANSLATION_STEP });
        assert_eq!(clip.channels[0].times, vec![0.0, 2.0]);
    }

    #[test]
    fn test_gltf_clip_moves_the_mesh() {
        let graph = GltfLoader.parse(TRIANGLE_GLTF.as_bytes()).unwrap();
        let rig = Rig::new(&graph);

        // The clip slides the node from x=0 to x=1 over two seconds; the rest
        // pose has it at x=1
        let matrices = rig.mesh_matrices(Mat4::IDENTITY, Some((&graph.animations[0], 1.0)), None);
        let p = matrices[0].transform_point3(Vec3::from(graph.meshes[0].vertices[0].position));
        assert!((p - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5, "{:?}", p);
    }

    #[test]
    fn test_spline_values_keep_the_middle() {
        assert_eq!(keyframe_values(vec![0, 1, 2, 3, 4, 5], true), vec![1, 4]);
        assert_eq!(keyframe_values(vec![0, 1], false), vec![0, 1]);
    }

    #[test]
    fn test_invalid_gltf() {
        assert!(GltfLoader.parse(b"not json").is_err());
    }
}
