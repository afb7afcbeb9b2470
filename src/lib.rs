pub mod constants;
pub mod error;

// Configuration and bindings
pub mod config;
pub mod property;
pub mod expression;
pub mod scope;
pub mod engine;
pub mod diagnostics;

// Scene and model loading
pub mod scene;
pub mod loader;
pub mod fetch;
pub mod gpu;

// Runtime
pub mod telemetry;
pub mod render_loop;
pub mod viewer;

pub use config::Configuration;
pub use error::ViewerError;
pub use viewer::{ModelViewer, ViewerStatus};

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
