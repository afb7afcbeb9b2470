//! Headless rendering into a texture, with optional PNG output per frame.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::error::LoadError;
use crate::gpu::renderer::Renderer;
use crate::scene::graph::SceneGraph;
use crate::scene::{FrameRenderer, FrameState};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const BYTES_PER_PIXEL: u32 = 4;

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    output_buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl Target {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Target Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            output_buffer,
            padded_bytes_per_row,
        }
    }
}

/// Rows copied out of a texture must be 256-byte aligned.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = BYTES_PER_PIXEL * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded + (align - unpadded % align) % align
}

pub struct OffscreenRenderer {
    renderer: Renderer,
    target: Target,
    out_dir: Option<PathBuf>,
    frames_written: u64,
}

impl OffscreenRenderer {
    /// Create a headless device and a `width`×`height` target. When
    /// `out_dir` is set, every rendered frame is written there.
    pub async fn new(width: u32, height: u32, out_dir: Option<PathBuf>) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No adapter found"))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        if let Some(dir) = &out_dir {
            std::fs::create_dir_all(dir)?;
        }

        let target = Target::new(&device, width.max(1), height.max(1));
        let renderer = Renderer::new(device, queue, TARGET_FORMAT, width.max(1), height.max(1));

        Ok(Self {
            renderer,
            target,
            out_dir,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write_frame(&mut self, frame_index: u64) -> Result<()> {
        let Some(out_dir) = &self.out_dir else {
            return Ok(());
        };
        let (width, height) = self.renderer.size();
        let device = self.renderer.device();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.target.output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.target.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.renderer.queue().submit(Some(encoder.finish()));

        let buffer_slice = self.target.output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = (width * BYTES_PER_PIXEL) as usize;
        let mut unpadded = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height {
            let start = (row * self.target.padded_bytes_per_row) as usize;
            unpadded.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        self.target.output_buffer.unmap();

        let frame_path = out_dir.join(format!("frame_{:05}.png", frame_index));
        image::save_buffer(&frame_path, &unpadded, width, height, image::ColorType::Rgba8)?;
        self.frames_written += 1;
        Ok(())
    }
}

impl FrameRenderer for OffscreenRenderer {
    fn prepare(&mut self, graph: &SceneGraph) -> Result<(), LoadError> {
        self.renderer.upload(graph, "Model");
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.renderer.size() {
            return;
        }
        self.renderer.resize(width, height);
        self.target = Target::new(self.renderer.device(), width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.renderer.size()
    }

    fn render(&mut self, frame: &FrameState) -> Result<()> {
        self.renderer.render(&self.target.view, frame);
        self.write_frame(frame.frame_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_rows_are_aligned() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(800), 3328);
    }
}
