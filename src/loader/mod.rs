//! Model format loaders.
//!
//! Each loader turns the raw bytes of one format into a [`SceneGraph`].
//! [`ModelLoaders`] picks the loader from the configured [`ModelType`].

pub mod collada;
pub mod gltf;
pub mod obj;

use std::collections::HashMap;

use crate::config::ModelType;
use crate::error::LoadError;
use crate::scene::graph::SceneGraph;

pub trait ModelLoader {
    fn parse(&self, bytes: &[u8]) -> Result<SceneGraph, LoadError>;
}

/// Loader registry keyed by model type.
pub struct ModelLoaders {
    loaders: HashMap<ModelType, Box<dyn ModelLoader>>,
}

impl Default for ModelLoaders {
    fn default() -> Self {
        let mut loaders = Self::empty();
        loaders.register(ModelType::Collada, Box::new(collada::ColladaLoader));
        loaders.register(ModelType::Obj, Box::new(obj::ObjLoader));
        loaders.register(ModelType::Gltf, Box::new(self::gltf::GltfLoader));
        loaders
    }
}

impl ModelLoaders {
    /// All built-in loaders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Replace the loader for a model type.
    pub fn register(&mut self, model_type: ModelType, loader: Box<dyn ModelLoader>) {
        self.loaders.insert(model_type, loader);
    }

    /// Parse a model. A model without any vertices is rejected.
    pub fn parse(&self, model_type: ModelType, bytes: &[u8]) -> Result<SceneGraph, LoadError> {
        let loader = self.loaders.get(&model_type).ok_or_else(|| {
            LoadError::parse(format_name(model_type), "no loader registered for this format")
        })?;

        let graph = loader.parse(bytes)?;
        if graph.is_empty() {
            return Err(LoadError::parse(format_name(model_type), "model contains no vertices"));
        }

        log::info!(
            "Loaded {} model: {} meshes, {} triangles, {} clips, {} joints",
            format_name(model_type),
            graph.meshes.len(),
            graph.triangle_count(),
            graph.animations.len(),
            graph.kinematics.as_ref().map_or(0, |k| k.len())
        );
        Ok(graph)
    }
}

pub(crate) fn format_name(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::Collada => "Collada",
        ModelType::Obj => "OBJ",
        ModelType::Gltf => "GLTF",
    }
}
