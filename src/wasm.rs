use std::rc::Rc;

use anyhow::{anyhow, Result};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlCanvasElement;

use crate::config::Configuration;
use crate::error::LoadError;
use crate::fetch::MemoryStore;
use crate::gpu::renderer::Renderer;
use crate::loader::ModelLoaders;
use crate::render_loop::{FrameCallback, FrameScheduler};
use crate::scene::graph::SceneGraph;
use crate::scene::{FrameRenderer, FrameState};
use crate::telemetry::{TelemetryEvent, TelemetryHub};
use crate::viewer::{ModelViewer, ViewerStatus};

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Frames paced by `window.requestAnimationFrame`.
pub struct AnimationFrameScheduler;

impl FrameScheduler for AnimationFrameScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        let Some(window) = web_sys::window() else {
            log::error!("No window; render loop cannot continue");
            return;
        };
        // rAF timestamps are milliseconds
        let closure: js_sys::Function =
            Closure::once_into_js(move |timestamp: f64| callback(timestamp / 1000.0)).unchecked_into();
        if let Err(e) = window.request_animation_frame(&closure) {
            log::error!("requestAnimationFrame failed: {:?}", e);
        }
    }
}

/// Renders into a canvas surface.
struct SurfaceRenderer {
    renderer: Renderer,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfaceRenderer {
    async fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let width = canvas.width().max(1);
        let height = canvas.height().max(1);
        let surface = instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas))
            .map_err(|e| anyhow!("Failed to create surface: {}", e))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find an appropriate adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| anyhow!("Failed to create device: {}", e))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let renderer = Renderer::new(device, queue, config.format, width, height);
        Ok(Self {
            renderer,
            surface,
            config,
        })
    }

    fn reconfigure(&mut self) {
        self.surface.configure(self.renderer.device(), &self.config);
    }
}

impl FrameRenderer for SurfaceRenderer {
    fn prepare(&mut self, graph: &SceneGraph) -> Result<(), LoadError> {
        self.renderer.upload(graph, "Model");
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.renderer.resize(width, height);
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
    }

    fn size(&self) -> (u32, u32) {
        self.renderer.size()
    }

    fn render(&mut self, frame: &FrameState) -> Result<()> {
        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.renderer.render(&view, frame);
                output.present();
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("Surface out of memory")),
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                Ok(())
            }
        }
    }
}

#[wasm_bindgen]
pub struct WasmModelViewer {
    viewer: ModelViewer,
    hub: TelemetryHub,
}

#[wasm_bindgen]
impl WasmModelViewer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmModelViewer, JsValue> {
        Err(JsValue::from_str("Use create_model_viewer async constructor"))
    }

    /// Deliver one telemetry event (`{fragment: {series: {value}}}` JSON).
    /// Returns false when the JSON is malformed.
    pub fn push_telemetry(&self, device_id: &str, json: &str) -> bool {
        match TelemetryEvent::from_json(json) {
            Ok(event) => {
                self.hub.publish(device_id, &event);
                true
            }
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewer.resize(width, height);
    }

    /// Stop rendering and release the subscription. The instance stays
    /// inert afterwards.
    pub fn destroy(&mut self) {
        self.viewer.teardown();
    }

    pub fn status(&self) -> String {
        match self.viewer.status() {
            ViewerStatus::Idle => "idle".to_string(),
            ViewerStatus::Ready => "ready".to_string(),
            ViewerStatus::Failed(reason) => format!("failed: {}", reason),
            ViewerStatus::TornDown => "torn_down".to_string(),
        }
    }

    pub fn snapshot_json(&self) -> String {
        self.viewer
            .snapshot()
            .and_then(|s| serde_json::to_string(&s).ok())
            .unwrap_or_else(|| "null".to_string())
    }

    pub fn take_diagnostics_json(&mut self) -> String {
        let diagnostics = self.viewer.take_diagnostics();
        serde_json::to_string(&diagnostics).unwrap_or_else(|_| "[]".to_string())
    }

    /// Bindable properties of the loaded model, for the configuration form.
    pub fn catalog_json(&self) -> String {
        serde_json::to_string(self.viewer.catalog()).unwrap_or_else(|_| "[]".to_string())
    }
}

#[wasm_bindgen]
pub async fn create_model_viewer(
    canvas: HtmlCanvasElement,
    config_json: String,
    model_bytes: Vec<u8>,
) -> Result<WasmModelViewer, JsValue> {
    init_panic_hook();

    let config = Configuration::from_json(&config_json).map_err(|e| {
        log::error!("Widget configuration rejected: {}", e);
        js_error(e)
    })?;
    let store = MemoryStore::new().with(config.binary_id.clone(), model_bytes);

    let renderer = SurfaceRenderer::new(canvas).await.map_err(js_error)?;

    let hub = TelemetryHub::new();
    let mut viewer = ModelViewer::new(config, Rc::new(hub.clone()));
    viewer
        .load(&store, &ModelLoaders::new(), Box::new(renderer))
        .map_err(js_error)?;

    let scheduler: Rc<dyn FrameScheduler> = Rc::new(AnimationFrameScheduler);
    viewer.start(&scheduler).map_err(js_error)?;

    Ok(WasmModelViewer { viewer, hub })
}
