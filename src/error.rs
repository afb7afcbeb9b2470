//! Error taxonomy for the viewer.
//!
//! Configuration and load errors are terminal for a viewer instance. Joint
//! and evaluation errors are scoped to a single binding and never stop the
//! remaining bindings or the render loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("widget configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("widget configuration data is unavailable")]
    MissingWidgetData,

    #[error("binary id is blank")]
    MissingBinaryId,

    #[error("model type is missing and cannot be derived from the binary name")]
    MissingModelType,

    #[error("unsupported model type '{0}' (expected .dae, .obj or .gltf)")]
    UnsupportedModelType(String),

    #[error("variable #{index} is invalid: {reason}")]
    InvalidVariable { index: usize, reason: String },

    #[error("property #{index} is invalid: {reason}")]
    InvalidProperty { index: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch model binary '{binary_id}': {reason}")]
    Fetch { binary_id: String, reason: String },

    #[error("failed to parse {model_type} model: {reason}")]
    Parse { model_type: &'static str, reason: String },

    #[error("renderer unavailable: {0}")]
    Renderer(String),
}

impl LoadError {
    pub fn parse(model_type: &'static str, reason: impl Into<String>) -> Self {
        LoadError::Parse {
            model_type,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JointError {
    #[error("joint '{0}' does not exist")]
    NotFound(String),

    #[error("joint '{0}' is static")]
    Static(String),

    #[error("joint '{name}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f32,
        min: f32,
        max: f32,
    },
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot subscribe to device '{device_id}': {reason}")]
    Subscribe { device_id: String, reason: String },

    #[error("malformed telemetry record: {0}")]
    Record(String),
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("no model is loaded")]
    NotLoaded,

    #[error("viewer has been torn down")]
    TornDown,
}
