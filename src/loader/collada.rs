//! Collada (`.dae`) loading.
//!
//! Supported subset:
//! - `library_geometries`: `triangles` and `polylist` primitives with
//!   `VERTEX` and optional `NORMAL` inputs. Polygons are fan-triangulated.
//! - `library_visual_scenes`: node hierarchies with `matrix`, `translate`,
//!   `rotate` and `scale` transforms, baked into the geometry and kept as
//!   scene nodes.
//! - `asset`: `unit` scaling and `Z_UP` conversion to Y-up.
//! - `library_animations` / `library_animation_clips`: channels targeting
//!   a whole `matrix`, `translate` or `scale` element, or a rotation's
//!   `ANGLE`.
//! - `library_joints` / `library_kinematics_models`: revolute and
//!   prismatic joints with limits. `bind_joint_axis` attaches a joint to
//!   the transform element it drives.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Mat4, Vec3};
use roxmltree::{Document, Node};

use super::ModelLoader;
use crate::error::LoadError;
use crate::gpu::mesh::Vertex;
use crate::scene::animation::{AnimationClip, Channel, Interpolation, Keyframes};
use crate::scene::graph::{
    compute_vertex_normals, steps_matrix, ModelMesh, SceneGraph, SceneNode, StepTarget, TransformStep,
};
use crate::scene::kinematics::{Joint, JointKind, JointLimits, Kinematics};

pub struct ColladaLoader;

impl ModelLoader for ColladaLoader {
    fn parse(&self, bytes: &[u8]) -> Result<SceneGraph, LoadError> {
        let text = std::str::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
        let doc = Document::parse(text).map_err(|e| parse_error(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "COLLADA" {
            return Err(parse_error(format!(
                "root element is <{}>, not <COLLADA>",
                root.tag_name().name()
            )));
        }

        let geometries = read_geometries(root)?;
        let scene = instantiate_scene(root, &geometries, asset_correction(root));
        let animations = read_clips(root, &scene)?;
        let kinematics = read_kinematics(root, &scene)?;

        let meshes = scene
            .instances
            .iter()
            .map(|(mesh, world, node)| {
                let mesh = transform_mesh(mesh, *world);
                match node {
                    Some(node) => mesh.with_node(*node),
                    None => mesh,
                }
            })
            .collect();

        Ok(SceneGraph {
            meshes,
            nodes: scene.nodes,
            animations,
            kinematics,
        })
    }
}

fn parse_error(reason: impl Into<String>) -> LoadError {
    LoadError::parse("Collada", reason)
}

// ============================================================================
// XML helpers
// ============================================================================

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child<'a, 'input: 'a>(node: Node<'a, 'input>, name: &'a str) -> Option<Node<'a, 'input>> {
    children(node, name).next()
}

fn descendants<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// `#id` or `id` to `id`.
fn url_id(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

fn parse_floats(node: Node) -> Result<Vec<f32>, LoadError> {
    node.text()
        .unwrap_or("")
        .split_whitespace()
        .map(|t| {
            t.parse::<f32>()
                .map_err(|_| parse_error(format!("'{}' in <{}> is not a number", t, node.tag_name().name())))
        })
        .collect()
}

fn parse_indices(node: Node) -> Result<Vec<usize>, LoadError> {
    node.text()
        .unwrap_or("")
        .split_whitespace()
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| parse_error(format!("'{}' in <{}> is not an index", t, node.tag_name().name())))
        })
        .collect()
}

fn single_float(node: Option<Node>) -> Result<Option<f32>, LoadError> {
    match node {
        Some(n) => Ok(parse_floats(n)?.first().copied()),
        None => Ok(None),
    }
}

// ============================================================================
// Geometry
// ============================================================================

struct Source {
    data: Vec<f32>,
    stride: usize,
}

impl Source {
    fn read(node: Node) -> Result<Self, LoadError> {
        let data = match child(node, "float_array") {
            Some(array) => parse_floats(array)?,
            None => Vec::new(),
        };
        let stride = child(node, "technique_common")
            .and_then(|t| child(t, "accessor"))
            .and_then(|a| a.attribute("stride"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        Ok(Self { data, stride })
    }

    fn vec3(&self, index: usize) -> Option<[f32; 3]> {
        let start = index * self.stride;
        let v = self.data.get(start..start + 3)?;
        Some([v[0], v[1], v[2]])
    }
}

struct Input<'a> {
    semantic: &'a str,
    source: &'a str,
    offset: usize,
}

fn read_inputs<'a>(primitive: Node<'a, '_>) -> Vec<Input<'a>> {
    children(primitive, "input")
        .filter_map(|input| {
            Some(Input {
                semantic: input.attribute("semantic")?,
                source: url_id(input.attribute("source")?),
                offset: input.attribute("offset").and_then(|o| o.parse().ok()).unwrap_or(0),
            })
        })
        .collect()
}

/// Geometry id to its meshes, one per primitive, in document order.
type GeometryTable = Vec<(String, Vec<ModelMesh>)>;

fn read_geometries(root: Node) -> Result<GeometryTable, LoadError> {
    let mut table = Vec::new();
    let Some(library) = child(root, "library_geometries") else {
        return Ok(table);
    };

    for geometry in children(library, "geometry") {
        let id = geometry.attribute("id").unwrap_or_default().to_string();
        let name = geometry.attribute("name").unwrap_or(&id).to_string();
        let Some(mesh) = child(geometry, "mesh") else {
            log::debug!("Geometry '{}' has no <mesh>; skipped", name);
            continue;
        };
        table.push((id, read_mesh(&name, mesh)?));
    }
    Ok(table)
}

fn read_mesh(name: &str, mesh: Node) -> Result<Vec<ModelMesh>, LoadError> {
    let mut sources = HashMap::new();
    for source in children(mesh, "source") {
        if let Some(id) = source.attribute("id") {
            sources.insert(id, Source::read(source)?);
        }
    }

    // <vertices> redirects VERTEX inputs to its own POSITION/NORMAL sources
    let mut vertices: HashMap<&str, Vec<Input>> = HashMap::new();
    for v in children(mesh, "vertices") {
        if let Some(id) = v.attribute("id") {
            vertices.insert(id, read_inputs(v));
        }
    }

    let mut meshes = Vec::new();
    for primitive in mesh.children().filter(Node::is_element) {
        let kind = primitive.tag_name().name();
        if !matches!(kind, "triangles" | "polylist") {
            if !matches!(kind, "source" | "vertices" | "extra") {
                log::warn!("Geometry '{}': <{}> primitives are not supported", name, kind);
            }
            continue;
        }
        if let Some(m) = read_primitive(name, primitive, &sources, &vertices)? {
            meshes.push(m);
        }
    }
    Ok(meshes)
}

fn read_primitive(
    name: &str,
    primitive: Node,
    sources: &HashMap<&str, Source>,
    vertices: &HashMap<&str, Vec<Input>>,
) -> Result<Option<ModelMesh>, LoadError> {
    let inputs = read_inputs(primitive);
    let tuple_len = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);

    let vertex_input = inputs
        .iter()
        .find(|i| i.semantic == "VERTEX")
        .ok_or_else(|| parse_error(format!("geometry '{}' has no VERTEX input", name)))?;
    let redirected = vertices.get(vertex_input.source).map(Vec::as_slice).unwrap_or(&[]);

    let source_for = |semantic: &str| {
        if let Some(input) = redirected.iter().find(|i| i.semantic == semantic) {
            return Some((sources.get(input.source)?, vertex_input.offset));
        }
        let input = inputs.iter().find(|i| i.semantic == semantic)?;
        Some((sources.get(input.source)?, input.offset))
    };

    let (positions_src, position_offset) = source_for("POSITION")
        .or_else(|| {
            // VERTEX pointing straight at a <source>
            Some((sources.get(vertex_input.source)?, vertex_input.offset))
        })
        .ok_or_else(|| parse_error(format!("geometry '{}' has no position source", name)))?;
    let normals_src = source_for("NORMAL");

    let p = match child(primitive, "p") {
        Some(p) => parse_indices(p)?,
        None => return Ok(None),
    };
    let corner_count = p.len() / tuple_len;

    let polygon_sizes: Vec<usize> = match child(primitive, "vcount") {
        Some(vcount) => parse_indices(vcount)?,
        None => vec![3; corner_count / 3],
    };

    let mut positions = Vec::with_capacity(corner_count);
    let mut normals = Vec::with_capacity(corner_count);
    let mut indices = Vec::new();

    let mut corner = 0;
    for size in polygon_sizes {
        if corner + size > corner_count {
            return Err(parse_error(format!("geometry '{}' index list is truncated", name)));
        }
        let first = positions.len() as u32;

        for c in corner..corner + size {
            let tuple = &p[c * tuple_len..(c + 1) * tuple_len];
            let position = positions_src.vec3(tuple[position_offset]).ok_or_else(|| {
                parse_error(format!("geometry '{}' position index out of range", name))
            })?;
            positions.push(position);
            if let Some((src, offset)) = normals_src {
                normals.push(src.vec3(tuple[offset]).unwrap_or([0.0, 1.0, 0.0]));
            }
        }

        // Fan triangulation
        for i in 1..size.saturating_sub(1) as u32 {
            indices.extend_from_slice(&[first, first + i, first + i + 1]);
        }
        corner += size;
    }

    if positions.is_empty() {
        return Ok(None);
    }

    let normals = (normals.len() == positions.len()).then_some(normals.as_slice());
    Ok(Some(ModelMesh::from_attributes(name, &positions, normals, None, indices)))
}

// ============================================================================
// Visual scene
// ============================================================================

/// The instantiated visual scene: geometry instances with their rest world
/// matrices, and the node tree they hang from.
#[derive(Default)]
struct VisualScene {
    instances: Vec<(ModelMesh, Mat4, Option<usize>)>,
    nodes: Vec<SceneNode>,
    /// Node id to index in `nodes`.
    ids: HashMap<String, usize>,
    /// Transform element sid, per node, to its step index.
    sids: HashMap<(usize, String), usize>,
}

impl VisualScene {
    /// Resolve a `node/sid` address, ignoring any leading path segments.
    fn target(&self, address: &str) -> Option<StepTarget> {
        let mut parts = address.rsplit('/');
        let sid = parts.next()?;
        let node = *self.ids.get(parts.next()?)?;
        let step = *self.sids.get(&(node, sid.to_string()))?;
        Some(StepTarget { node, step })
    }

    fn step(&self, target: StepTarget) -> Option<&TransformStep> {
        self.nodes.get(target.node)?.steps.get(target.step)
    }
}

/// Without a visual scene every geometry is used once, untransformed
/// apart from the asset correction.
fn instantiate_scene(root: Node, geometries: &GeometryTable, correction: Mat4) -> VisualScene {
    let scene_id = child(root, "scene")
        .and_then(|s| child(s, "instance_visual_scene"))
        .and_then(|i| i.attribute("url"))
        .map(url_id);

    let visual_scene = child(root, "library_visual_scenes").and_then(|library| {
        children(library, "visual_scene")
            .find(|s| scene_id.map_or(true, |id| s.attribute("id") == Some(id)))
    });

    let mut scene = VisualScene::default();
    if let Some(visual_scene) = visual_scene {
        for node in children(visual_scene, "node") {
            visit_node(node, None, Mat4::IDENTITY, correction, geometries, &mut scene);
        }
    }

    if scene.instances.is_empty() {
        scene.instances = geometries
            .iter()
            .flat_map(|(_, meshes)| meshes.iter().cloned())
            .map(|mesh| (mesh, correction, None))
            .collect();
    }
    scene
}

fn visit_node(
    node: Node,
    parent: Option<usize>,
    parent_world: Mat4,
    correction: Mat4,
    geometries: &GeometryTable,
    scene: &mut VisualScene,
) {
    let index = scene.nodes.len();
    let mut steps = Vec::new();
    // Root nodes carry the asset correction as their first step
    if parent.is_none() && correction != Mat4::IDENTITY {
        steps.push(TransformStep::Matrix(correction));
    }
    for (sid, step) in read_steps(node) {
        if let Some(sid) = sid {
            scene.sids.insert((index, sid.to_string()), steps.len());
        }
        steps.push(step);
    }

    let world = parent_world * steps_matrix(&steps);
    let name = node.attribute("name").or(node.attribute("id")).unwrap_or("node");
    scene.nodes.push(SceneNode::new(name, parent, steps));
    if let Some(id) = node.attribute("id") {
        scene.ids.insert(id.to_string(), index);
    }

    for instance in children(node, "instance_geometry") {
        let Some(id) = instance.attribute("url").map(url_id) else {
            continue;
        };
        match geometries.iter().find(|(geometry_id, _)| geometry_id == id) {
            Some((_, meshes)) => scene
                .instances
                .extend(meshes.iter().cloned().map(|m| (m, world, Some(index)))),
            None => log::warn!("Node references unknown geometry '{}'", id),
        }
    }

    for child_node in children(node, "node") {
        visit_node(child_node, Some(index), world, correction, geometries, scene);
    }
}

/// Collada matrices are row-major.
fn row_major(v: &[f32]) -> Mat4 {
    let mut cols = [0.0; 16];
    cols.copy_from_slice(&v[..16]);
    Mat4::from_cols_array(&cols).transpose()
}

/// A node's transform elements, in document order, with their sids.
fn read_steps<'a>(node: Node<'a, '_>) -> Vec<(Option<&'a str>, TransformStep)> {
    let mut steps = Vec::new();
    for element in node.children().filter(Node::is_element) {
        let Ok(values) = parse_floats(element) else {
            continue;
        };
        let step = match (element.tag_name().name(), values.as_slice()) {
            ("matrix", v) if v.len() == 16 => TransformStep::Matrix(row_major(v)),
            ("translate", [x, y, z]) => TransformStep::Translate(Vec3::new(*x, *y, *z)),
            ("scale", [x, y, z]) => TransformStep::Scale(Vec3::new(*x, *y, *z)),
            ("rotate", [x, y, z, degrees]) => {
                let axis = Vec3::new(*x, *y, *z).normalize_or_zero();
                if axis == Vec3::ZERO {
                    continue;
                }
                TransformStep::AxisAngle(axis, degrees.to_radians())
            }
            _ => continue,
        };
        steps.push((element.attribute("sid"), step));
    }
    steps
}

/// Unit scale and up-axis conversion from `<asset>`.
fn asset_correction(root: Node) -> Mat4 {
    let asset = child(root, "asset");
    let meter = asset
        .and_then(|a| child(a, "unit"))
        .and_then(|u| u.attribute("meter"))
        .and_then(|m| m.parse::<f32>().ok())
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(1.0);
    let z_up = asset
        .and_then(|a| child(a, "up_axis"))
        .and_then(|u| u.text())
        .is_some_and(|t| t.trim() == "Z_UP");

    let scale = Mat4::from_scale(Vec3::splat(meter));
    if z_up {
        Mat4::from_rotation_x(-FRAC_PI_2) * scale
    } else {
        scale
    }
}

fn transform_mesh(mesh: &ModelMesh, world: Mat4) -> ModelMesh {
    if world == Mat4::IDENTITY {
        return mesh.clone();
    }
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let vertices: Vec<Vertex> = mesh
        .vertices
        .iter()
        .map(|v| {
            Vertex::new(
                world.transform_point3(Vec3::from(v.position)).to_array(),
                (normal_matrix * Vec3::from(v.normal)).normalize_or_zero().to_array(),
                v.color,
            )
        })
        .collect();

    // A mirroring transform flips the winding; regenerate normals from it
    let vertices = if world.determinant() < 0.0 {
        let positions: Vec<[f32; 3]> = vertices.iter().map(|v| v.position).collect();
        let normals = compute_vertex_normals(&positions, &mesh.indices);
        vertices
            .into_iter()
            .zip(normals)
            .map(|(v, n)| Vertex::new(v.position, n, v.color))
            .collect()
    } else {
        vertices
    };

    ModelMesh::new(mesh.name.clone(), vertices, mesh.indices.clone())
}

// ============================================================================
// Animation clips
// ============================================================================

fn read_clips(root: Node, scene: &VisualScene) -> Result<Vec<AnimationClip>, LoadError> {
    let Some(library) = child(root, "library_animations") else {
        return Ok(Vec::new());
    };

    let mut floats: HashMap<&str, Vec<f32>> = HashMap::new();
    let mut names: HashMap<&str, &str> = HashMap::new();
    for source in descendants(library, "source") {
        let Some(id) = source.attribute("id") else {
            continue;
        };
        if let Some(array) = child(source, "float_array") {
            floats.insert(id, parse_floats(array)?);
        } else if let Some(text) = child(source, "Name_array").and_then(|a| a.text()) {
            names.insert(id, text);
        }
    }

    let samplers: HashMap<&str, Node> = descendants(library, "sampler")
        .filter_map(|s| Some((s.attribute("id")?, s)))
        .collect();

    let mut duration: f32 = 0.0;
    for sampler in samplers.values() {
        let times = read_inputs(*sampler)
            .into_iter()
            .find(|i| i.semantic == "INPUT")
            .and_then(|i| floats.get(i.source));
        if let Some(times) = times {
            duration = times.iter().copied().fold(duration, f32::max);
        }
    }

    let sources = AnimationSources {
        floats: &floats,
        names: &names,
        samplers: &samplers,
        scene,
    };
    let channels_of = |animation: Node| -> Vec<Channel> {
        descendants(animation, "channel")
            .filter_map(|channel| sources.channel(channel))
            .collect()
    };

    let named: Vec<AnimationClip> = child(root, "library_animation_clips")
        .into_iter()
        .flat_map(|l| children(l, "animation_clip"))
        .map(|clip| {
            let name = clip
                .attribute("name")
                .or(clip.attribute("id"))
                .unwrap_or("default");
            let start = clip.attribute("start").and_then(|s| s.parse::<f32>().ok()).unwrap_or(0.0);
            let end = clip
                .attribute("end")
                .and_then(|s| s.parse::<f32>().ok())
                .unwrap_or(duration);

            let channels = children(clip, "instance_animation")
                .filter_map(|instance| instance.attribute("url").map(url_id))
                .filter_map(|id| descendants(library, "animation").find(|a| a.attribute("id") == Some(id)))
                .flat_map(channels_of)
                .map(|mut channel| {
                    // Clip time 0 is the clip's start
                    channel.times.iter_mut().for_each(|t| *t -= start);
                    channel
                })
                .collect();
            AnimationClip::new(name, (end - start).max(0.0)).with_channels(channels)
        })
        .collect();

    if !named.is_empty() {
        Ok(named)
    } else if !samplers.is_empty() {
        Ok(vec![AnimationClip::new("default", duration).with_channels(channels_of(library))])
    } else {
        Ok(Vec::new())
    }
}

struct AnimationSources<'s, 'a, 'input> {
    floats: &'s HashMap<&'a str, Vec<f32>>,
    names: &'s HashMap<&'a str, &'a str>,
    samplers: &'s HashMap<&'a str, Node<'a, 'input>>,
    scene: &'s VisualScene,
}

impl AnimationSources<'_, '_, '_> {
    fn channel(&self, channel: Node) -> Option<Channel> {
        let address = channel.attribute("target")?;
        let sampler = self.samplers.get(url_id(channel.attribute("source")?))?;
        let inputs = read_inputs(*sampler);
        let source_id = |semantic: &str| inputs.iter().find(|i| i.semantic == semantic).map(|i| i.source);

        let times = self.floats.get(source_id("INPUT")?)?.clone();
        let values = self.floats.get(source_id("OUTPUT")?)?;
        let interpolation = match source_id("INTERPOLATION").and_then(|id| self.names.get(id)) {
            Some(names) if names.split_whitespace().all(|n| n == "STEP") => Interpolation::Step,
            _ => Interpolation::Linear,
        };

        let (path, member) = match address.split_once('.') {
            Some((path, member)) => (path, Some(member)),
            None => (address, None),
        };
        let Some(target) = self.scene.target(path) else {
            log::debug!("Animation target '{}' is not a node transform; skipped", address);
            return None;
        };

        let keyframes = match (self.scene.step(target)?, member) {
            (TransformStep::Matrix(_), None) => Keyframes::Matrices(
                values
                    .chunks_exact(16)
                    .map(|m| row_major(m).to_scale_rotation_translation())
                    .collect(),
            ),
            (TransformStep::Translate(_), None) => Keyframes::Translations(
                values.chunks_exact(3).map(Vec3::from_slice).collect(),
            ),
            (TransformStep::Scale(_), None) => {
                Keyframes::Scales(values.chunks_exact(3).map(Vec3::from_slice).collect())
            }
            (TransformStep::AxisAngle(..), Some("ANGLE")) => {
                Keyframes::Angles(values.iter().map(|d| d.to_radians()).collect())
            }
            _ => {
                log::debug!("Animation target '{}' is not supported; skipped", address);
                return None;
            }
        };

        Some(Channel {
            target,
            times,
            keyframes,
            interpolation,
        })
    }
}

// ============================================================================
// Kinematics
// ============================================================================

fn read_joint(definition: Node, name: &str) -> Result<Option<Joint>, LoadError> {
    let Some(primitive) = definition
        .children()
        .find(|n| matches!(n.tag_name().name(), "revolute" | "prismatic"))
    else {
        return Ok(None);
    };

    let kind = match primitive.tag_name().name() {
        "prismatic" => JointKind::Prismatic,
        _ => JointKind::Revolute,
    };

    let axis = match child(primitive, "axis") {
        Some(axis) => match parse_floats(axis)?.as_slice() {
            [x, y, z] => [*x, *y, *z],
            _ => return Err(parse_error(format!("joint '{}' axis needs three values", name))),
        },
        None => [0.0, 0.0, 1.0],
    };

    // Missing limits collapse to zero, which makes the joint static
    let limits = child(primitive, "limits");
    let min = single_float(limits.and_then(|l| child(l, "min")))?.unwrap_or(0.0);
    let max = single_float(limits.and_then(|l| child(l, "max")))?.unwrap_or(0.0);

    Ok(Some(Joint::new(name, kind, axis, JointLimits { min, max })))
}

fn read_kinematics(root: Node, scene: &VisualScene) -> Result<Option<Kinematics>, LoadError> {
    let library = child(root, "library_joints");
    let definition = |id: &str| {
        library.and_then(|l| children(l, "joint").find(|j| j.attribute("id") == Some(id)))
    };

    let mut joints = Vec::new();

    // Joints named by their sid inside the kinematics model
    let models = child(root, "library_kinematics_models");
    for common in models
        .into_iter()
        .flat_map(|l| descendants(l, "technique_common"))
    {
        for element in common.children().filter(Node::is_element) {
            let Some(sid) = element.attribute("sid") else {
                continue;
            };
            let joint = match element.tag_name().name() {
                "instance_joint" => match element.attribute("url").map(url_id).and_then(definition) {
                    Some(def) => read_joint(def, sid)?,
                    None => {
                        log::warn!("Instance joint '{}' references an unknown joint", sid);
                        None
                    }
                },
                "joint" => read_joint(element, sid)?,
                _ => None,
            };
            joints.extend(joint);
        }
    }

    // Without a kinematics model, every library joint by name
    if joints.is_empty() {
        for def in library.into_iter().flat_map(|l| children(l, "joint")) {
            let Some(name) = def.attribute("name").or(def.attribute("id")) else {
                continue;
            };
            joints.extend(read_joint(def, name)?);
        }
    }

    bind_joints(root, &mut joints, scene);
    Ok((!joints.is_empty()).then(|| Kinematics::new(joints)))
}

/// Attach joints to the transform elements named by `bind_joint_axis`.
fn bind_joints(root: Node, joints: &mut [Joint], scene: &VisualScene) {
    for bind in descendants(root, "bind_joint_axis") {
        let Some(address) = bind.attribute("target") else {
            continue;
        };
        let Some(target) = scene.target(address) else {
            log::warn!("Joint axis target '{}' is not a node transform", address);
            continue;
        };
        let reference = child(bind, "axis")
            .into_iter()
            .flat_map(|axis| axis.descendants())
            .filter_map(|n| n.text())
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or_default();

        // The longest joint name the axis reference mentions
        let joint = joints
            .iter_mut()
            .filter(|j| mentions(reference, j.name()))
            .max_by_key(|j| j.name().len());
        match joint {
            Some(joint) => *joint = joint.clone().with_target(target),
            None => log::warn!("Joint axis '{}' matches no joint", reference),
        }
    }
}

/// Whether `name` appears in `reference` delimited by non-alphanumerics.
fn mentions(reference: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    reference.match_indices(name).any(|(at, _)| {
        let before = reference[..at].chars().next_back();
        let after = reference[at + name.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
