//! GPU renderer for a loaded model.
//!
//! Draws each model mesh with its own model matrix, the optional grid
//! helper, and clears to the configured background colour.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::constants::{
    GRID_CENTER_COLOR, GRID_DIVISIONS, GRID_LINE_COLOR, GRID_SIZE, GROUND_COLOR, SKY_COLOR,
};
use crate::gpu::mesh::{self, Vertex};
use crate::gpu::pipeline;
use crate::scene::graph::SceneGraph;
use crate::scene::FrameState;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    sky_color: [f32; 4],
    ground_color: [f32; 4],
}

impl Uniforms {
    fn new(view_proj: glam::Mat4, model: glam::Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            sky_color: [SKY_COLOR[0], SKY_COLOR[1], SKY_COLOR[2], 1.0],
            ground_color: [GROUND_COLOR[0], GROUND_COLOR[1], GROUND_COLOR[2], 1.0],
        }
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, label: &str, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// A model mesh with its own uniforms, and its position in the scene graph.
struct ModelDraw {
    source: usize,
    mesh: GpuMesh,
    uniforms: UniformSlot,
}

/// A uniform buffer and the bind group that exposes it.
struct UniformSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformSlot {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[Uniforms::new(glam::Mat4::IDENTITY, glam::Mat4::IDENTITY)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        });
        Self { buffer, bind_group }
    }
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    size: wgpu::Extent3d,
    model_pipeline: wgpu::RenderPipeline,
    grid_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    grid_uniforms: UniformSlot,
    grid: GpuMesh,
    meshes: Vec<ModelDraw>,
    depth_view: wgpu::TextureView,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                },
                count: None,
            }],
            label: Some("uniform_bind_group_layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Model Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let model_pipeline = pipeline::create_model_pipeline(&device, &pipeline_layout, format);
        let grid_pipeline = pipeline::create_grid_pipeline(&device, &pipeline_layout, format);

        let grid_uniforms = UniformSlot::new(&device, &bind_group_layout, "Grid Uniforms");

        let (grid_vertices, grid_indices) =
            mesh::create_grid_geometry(GRID_SIZE, GRID_DIVISIONS, GRID_CENTER_COLOR, GRID_LINE_COLOR);
        let grid = GpuMesh::new(&device, "Grid", &grid_vertices, &grid_indices);

        let depth_view = pipeline::create_depth_view(&device, width, height);

        Self {
            device,
            queue,
            format,
            size,
            model_pipeline,
            grid_pipeline,
            bind_group_layout,
            grid_uniforms,
            grid,
            meshes: Vec::new(),
            depth_view,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    /// Replace the uploaded geometry with the meshes of `graph`.
    pub fn upload(&mut self, graph: &SceneGraph, label: &str) {
        self.meshes = graph
            .meshes
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.indices.is_empty())
            .map(|(source, m)| {
                let name = format!("{} {}", label, m.name);
                ModelDraw {
                    source,
                    mesh: GpuMesh::new(&self.device, &name, &m.vertices, &m.indices),
                    uniforms: UniformSlot::new(
                        &self.device,
                        &self.bind_group_layout,
                        &format!("{} Uniforms", name),
                    ),
                }
            })
            .collect();
        log::debug!("Uploaded {} meshes to the GPU", self.meshes.len());
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.size = wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            };
            self.depth_view = pipeline::create_depth_view(&self.device, width, height);
        }
    }

    pub fn render(&mut self, view: &wgpu::TextureView, frame: &FrameState) {
        for draw in &self.meshes {
            let model = frame.mesh_matrices.get(draw.source).copied().unwrap_or(frame.model);
            self.queue.write_buffer(
                &draw.uniforms.buffer,
                0,
                bytemuck::cast_slice(&[Uniforms::new(frame.view_proj, model)]),
            );
        }
        if frame.show_grid {
            self.queue.write_buffer(
                &self.grid_uniforms.buffer,
                0,
                bytemuck::cast_slice(&[Uniforms::new(frame.view_proj, glam::Mat4::IDENTITY)]),
            );
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let [r, g, b] = frame.background;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: srgb_to_linear(r) as f64,
                            g: srgb_to_linear(g) as f64,
                            b: srgb_to_linear(b) as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if frame.show_grid {
                render_pass.set_pipeline(&self.grid_pipeline);
                render_pass.set_bind_group(0, &self.grid_uniforms.bind_group, &[]);
                self.grid.draw(&mut render_pass);
            }

            render_pass.set_pipeline(&self.model_pipeline);
            for draw in &self.meshes {
                render_pass.set_bind_group(0, &draw.uniforms.bind_group, &[]);
                draw.mesh.draw(&mut render_pass);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Clear colours are specified in linear space.
fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
