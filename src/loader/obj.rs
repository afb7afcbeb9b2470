//! Wavefront OBJ loading.
//!
//! Every object in the file becomes one mesh. Material libraries are not
//! resolved; all meshes use the default model colour.

use std::collections::HashMap;

use super::ModelLoader;
use crate::error::LoadError;
use crate::scene::graph::{ModelMesh, SceneGraph};

pub struct ObjLoader;

impl ModelLoader for ObjLoader {
    fn parse(&self, bytes: &[u8]) -> Result<SceneGraph, LoadError> {
        let mut cursor = std::io::Cursor::new(bytes);

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) =
            tobj::load_obj_buf(&mut cursor, &load_options, |_| Ok((vec![], HashMap::new())))
                .map_err(|e| LoadError::parse("OBJ", e.to_string()))?;

        let meshes = models
            .iter()
            .filter(|model| !model.mesh.positions.is_empty())
            .map(|model| {
                let mesh = &model.mesh;
                let positions: Vec<[f32; 3]> = mesh
                    .positions
                    .chunks_exact(3)
                    .map(|p| [p[0], p[1], p[2]])
                    .collect();
                let normals: Vec<[f32; 3]> = mesh
                    .normals
                    .chunks_exact(3)
                    .map(|n| [n[0], n[1], n[2]])
                    .collect();
                let normals = (!normals.is_empty()).then_some(normals.as_slice());

                ModelMesh::from_attributes(&model.name, &positions, normals, None, mesh.indices.clone())
            })
            .collect();

        Ok(SceneGraph {
            meshes,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obj_parsing() {
        let obj_content = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 3
        "#;

        let graph = ObjLoader.parse(obj_content.as_bytes()).unwrap();
        assert_eq!(graph.meshes.len(), 1);
        assert_eq!(graph.meshes[0].vertices.len(), 3);
        assert_eq!(graph.meshes[0].indices, vec![0, 1, 2]);
        // Generated normals face +Z for a counter-clockwise XY triangle
        assert_eq!(graph.meshes[0].vertices[0].normal, [0.0, 0.0, 1.0]);
        assert!(graph.animations.is_empty());
        assert!(graph.kinematics.is_none());
    }

    #[test]
    fn test_quads_are_triangulated() {
        let obj_content = "o quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";

        let graph = ObjLoader.parse(obj_content.as_bytes()).unwrap();
        assert_eq!(graph.meshes[0].name, "quad");
        assert_eq!(graph.triangle_count(), 2);
    }

    #[test]
    fn test_provided_normals_are_kept() {
        let obj_content = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 1 0\nf 1//1 2//1 3//1\n";

        let graph = ObjLoader.parse(obj_content.as_bytes()).unwrap();
        assert_eq!(graph.meshes[0].vertices[1].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_objects_become_separate_meshes() {
        let obj_content = "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\no b\nv 0 0 1\nv 1 0 1\nv 0 1 1\nf 4 5 6\n";

        let graph = ObjLoader.parse(obj_content.as_bytes()).unwrap();
        assert_eq!(graph.meshes.len(), 2);
        assert_eq!(graph.meshes[1].indices, vec![0, 1, 2]);
        assert_eq!(graph.meshes[1].bounds.min[2], 1.0);
    }
}
