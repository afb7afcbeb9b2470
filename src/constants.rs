//! Fixed rendering and configuration constants.

/// Background used when the configuration does not provide a usable colour.
pub const DEFAULT_BACKGROUND_COLOR: &str = "#6d82a3";

/// Length of a `#rrggbb` colour string.
pub const BACKGROUND_COLOR_LEN: usize = 7;

// Camera
pub const CAMERA_FOV_DEGREES: f32 = 50.0;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 2000.0;

/// Camera position used while the orbit speed is zero.
pub const CAMERA_REST_POSITION: [f32; 3] = [0.0, 10.0, 20.0];
pub const CAMERA_LOOK_AT: [f32; 3] = [0.0, 5.0, 0.0];
pub const ORBIT_RADIUS: f32 = 20.0;
pub const ORBIT_HEIGHT: f32 = 10.0;
/// Elapsed seconds are scaled by this before the orbit speed is applied.
pub const ORBIT_RATE: f32 = 0.2;

// Grid helper
pub const GRID_SIZE: f32 = 20.0;
pub const GRID_DIVISIONS: u32 = 20;
pub const GRID_CENTER_COLOR: [f32; 3] = [0.267, 0.267, 0.267];
pub const GRID_LINE_COLOR: [f32; 3] = [0.533, 0.533, 0.533];

// Hemisphere light
pub const SKY_COLOR: [f32; 3] = [1.0, 0.933, 0.933];
pub const GROUND_COLOR: [f32; 3] = [0.067, 0.067, 0.133];

/// Initial surface size before the host reports a real one.
pub const DEFAULT_VIEWPORT: (u32, u32) = (800, 600);

/// Vertex colour for meshes that carry no material colour.
pub const MODEL_COLOR: [f32; 3] = [0.8, 0.8, 0.8];
