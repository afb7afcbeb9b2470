pub mod mesh;
pub mod pipeline;
pub mod renderer;

#[cfg(not(target_arch = "wasm32"))]
pub mod offscreen;
