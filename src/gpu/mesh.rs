use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12, // [f32; 3] is 12 bytes
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Line-list geometry for a square grid in the XZ plane, centered at the
/// origin. The two center lines use `center_color`.
pub fn create_grid_geometry(
    size: f32,
    divisions: u32,
    center_color: [f32; 3],
    line_color: [f32; 3],
) -> (Vec<Vertex>, Vec<u32>) {
    let divisions = divisions.max(1);
    let step = size / divisions as f32;
    let half = size / 2.0;
    let center = divisions / 2;
    // Grid lines are unlit; the shader treats a zero normal as emissive.
    let normal = [0.0, 0.0, 0.0];

    let mut vertices = Vec::with_capacity(((divisions + 1) * 4) as usize);
    for i in 0..=divisions {
        let k = -half + i as f32 * step;
        let color = if i == center { center_color } else { line_color };

        vertices.push(Vertex::new([-half, 0.0, k], normal, color));
        vertices.push(Vertex::new([half, 0.0, k], normal, color));
        vertices.push(Vertex::new([k, 0.0, -half], normal, color));
        vertices.push(Vertex::new([k, 0.0, half], normal, color));
    }

    let indices = (0..vertices.len() as u32).collect();
    (vertices, indices)
}
