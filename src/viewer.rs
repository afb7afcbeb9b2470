//! Widget orchestration.
//!
//! A [`ModelViewer`] owns one resolved [`Configuration`] and, once a model
//! is loaded, one [`RuntimeState`] (the variable scope and the scene). The
//! render loop and the telemetry callback both reach the runtime through
//! weak references; dropping the runtime on teardown is what makes both of
//! them inert.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Configuration;
use crate::diagnostics::BindingDiagnostic;
use crate::engine::{EvaluationReport, PropertyEvaluationEngine};
use crate::error::{LoadError, ViewerError};
use crate::fetch::ModelBinaryFetch;
use crate::loader::ModelLoaders;
use crate::property::{builtin_catalog, joint_catalog, PropertyDescriptor};
use crate::render_loop::{FrameScheduler, FrameTarget, LoopState, RenderLoop};
use crate::scene::{FrameRenderer, ModelScene, SceneAdapter, SceneSnapshot};
use crate::scope::VariableScope;
use crate::telemetry::{SubscriptionHandle, TelemetryEvent, TelemetrySubscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    /// Nothing loaded yet.
    Idle,
    /// Model loaded; the render loop may run.
    Ready,
    /// Configuration or load failed. The viewer stays empty.
    Failed(String),
    TornDown,
}

/// The mutable half of a viewer: everything bindings and frames touch.
pub struct RuntimeState {
    pub scope: VariableScope,
    pub scene: Box<dyn SceneAdapter>,
    engine: PropertyEvaluationEngine,
    last_report: Option<EvaluationReport>,
}

impl RuntimeState {
    pub fn new(scope: VariableScope, scene: Box<dyn SceneAdapter>) -> Self {
        Self {
            scope,
            scene,
            engine: PropertyEvaluationEngine::new(),
            last_report: None,
        }
    }

    /// Run one evaluation pass over `config.properties`.
    pub fn evaluate(&mut self, config: &Configuration) -> &EvaluationReport {
        let report = self
            .engine
            .run(&config.properties, &self.scope, self.scene.as_mut());
        self.last_report.insert(report)
    }

    /// Patch the scope from a telemetry event and re-evaluate every binding.
    pub fn on_telemetry(&mut self, config: &Configuration, event: &TelemetryEvent) -> &EvaluationReport {
        let updated = self.scope.apply_telemetry(&config.variables, event);
        log::debug!("Telemetry updated {} variables", updated);
        self.evaluate(config)
    }

    pub fn last_report(&self) -> Option<&EvaluationReport> {
        self.last_report.as_ref()
    }

    pub fn evaluation_passes(&self) -> u64 {
        self.engine.passes()
    }
}

impl FrameTarget for RuntimeState {
    fn advance(&mut self, delta: f32) {
        self.scene.advance(delta);
    }

    fn render(&mut self) {
        self.scene.render();
    }
}

pub struct ModelViewer {
    config: Rc<Configuration>,
    telemetry: Rc<dyn TelemetrySubscription>,
    runtime: Option<Rc<RefCell<RuntimeState>>>,
    subscription: Option<SubscriptionHandle>,
    render_loop: RenderLoop,
    catalog: Vec<PropertyDescriptor>,
    status: ViewerStatus,
}

impl ModelViewer {
    pub fn new(config: Configuration, telemetry: Rc<dyn TelemetrySubscription>) -> Self {
        Self {
            config: Rc::new(config),
            telemetry,
            runtime: None,
            subscription: None,
            render_loop: RenderLoop::new(),
            catalog: builtin_catalog(),
            status: ViewerStatus::Idle,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    /// Fetch, parse and show the configured model.
    ///
    /// A failure leaves the viewer `Failed` and empty. Loading again while a
    /// model is shown releases the previous one first.
    pub fn load(
        &mut self,
        fetch: &dyn ModelBinaryFetch,
        loaders: &ModelLoaders,
        renderer: Box<dyn FrameRenderer>,
    ) -> Result<(), ViewerError> {
        if self.status == ViewerStatus::TornDown {
            return Err(ViewerError::TornDown);
        }
        if self.runtime.is_some() {
            log::info!("Reloading model; releasing the current one");
            self.release();
        }

        match self.try_load(fetch, loaders, renderer) {
            Ok(()) => {
                self.status = ViewerStatus::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Model viewer failed to load: {}", e);
                self.status = ViewerStatus::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    fn try_load(
        &mut self,
        fetch: &dyn ModelBinaryFetch,
        loaders: &ModelLoaders,
        renderer: Box<dyn FrameRenderer>,
    ) -> Result<(), LoadError> {
        let payload = fetch.fetch(&self.config.binary_id)?;
        let graph = loaders.parse(self.config.model_type, &payload.bytes)?;

        let mut catalog = builtin_catalog();
        if let Some(kinematics) = &graph.kinematics {
            catalog.extend(joint_catalog(kinematics));
        }

        let scene = ModelScene::new(graph, self.config.display.clone(), renderer)?;
        let scope = VariableScope::load(&self.config.variables);
        let runtime = Rc::new(RefCell::new(RuntimeState::new(scope, Box::new(scene))));

        self.catalog = catalog;
        self.subscription = self.subscribe(&runtime);
        if self.subscription.is_none() {
            // No telemetry will arrive: evaluate the literals once now
            runtime.borrow_mut().evaluate(&self.config);
        }
        self.runtime = Some(runtime);

        log::info!(
            "Model {} ready (sha256 {})",
            payload.binary_id,
            payload.short_fingerprint()
        );
        Ok(())
    }

    /// Subscribe when a device is selected and some variable reads from it.
    /// The first evaluation then waits for the first event.
    fn subscribe(&self, runtime: &Rc<RefCell<RuntimeState>>) -> Option<SubscriptionHandle> {
        let Some(device_id) = self.config.subscription_device() else {
            if self.config.has_device_variables() {
                log::info!("No device selected; device variables stay unset (static-only mode)");
            }
            return None;
        };

        let weak = Rc::downgrade(runtime);
        let config = Rc::clone(&self.config);
        let callback = Box::new(move |event: &TelemetryEvent| {
            let Some(runtime) = weak.upgrade() else {
                return;
            };
            match runtime.try_borrow_mut() {
                Ok(mut runtime) => {
                    runtime.on_telemetry(&config, event);
                }
                Err(_) => log::warn!("Runtime busy; telemetry event dropped"),
            };
        });

        match self.telemetry.subscribe(device_id, callback) {
            Ok(handle) => {
                log::info!("Waiting for telemetry from device {} before evaluating", device_id);
                Some(handle)
            }
            Err(e) => {
                log::warn!("{}; continuing in static-only mode", e);
                None
            }
        }
    }

    /// Start the render loop. Only a loaded viewer renders.
    pub fn start(&mut self, scheduler: &Rc<dyn FrameScheduler>) -> Result<(), ViewerError> {
        match (&self.status, &self.runtime) {
            (ViewerStatus::TornDown, _) => Err(ViewerError::TornDown),
            (ViewerStatus::Ready, Some(runtime)) => {
                let target: Rc<RefCell<dyn FrameTarget>> = runtime.clone();
                self.render_loop.start(Rc::downgrade(&target), scheduler);
                Ok(())
            }
            _ => Err(ViewerError::NotLoaded),
        }
    }

    pub fn stop(&mut self) {
        self.render_loop.stop();
    }

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    /// Host resize notification; renders immediately.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(runtime) = &self.runtime else {
            log::debug!("Resize before load ignored");
            return;
        };
        match runtime.try_borrow_mut() {
            Ok(mut runtime) => runtime.scene.resize(width, height),
            Err(_) => log::warn!("Runtime busy; resize to {}x{} dropped", width, height),
        };
    }

    /// Unsubscribe, stop the loop and drop the scene. Safe to call any
    /// number of times.
    pub fn teardown(&mut self) {
        if self.status == ViewerStatus::TornDown {
            return;
        }
        self.release();
        self.status = ViewerStatus::TornDown;
        log::info!("Model viewer torn down");
    }

    fn release(&mut self) {
        if let Some(handle) = self.subscription.take() {
            if !self.telemetry.unsubscribe(handle) {
                log::debug!("Subscription {} was already gone", handle.0);
            }
        }
        self.render_loop.stop();
        self.runtime = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn snapshot(&self) -> Option<SceneSnapshot> {
        let runtime = self.runtime.as_ref()?;
        let runtime = runtime.try_borrow().ok()?;
        Some(runtime.scene.snapshot())
    }

    /// Current scope value of a variable.
    pub fn variable(&self, name: &str) -> Option<f32> {
        let runtime = self.runtime.as_ref()?;
        let runtime = runtime.try_borrow().ok()?;
        runtime.scope.get(name)
    }

    pub fn last_report(&self) -> Option<EvaluationReport> {
        let runtime = self.runtime.as_ref()?;
        let runtime = runtime.try_borrow().ok()?;
        runtime.last_report().cloned()
    }

    pub fn evaluation_passes(&self) -> u64 {
        self.runtime
            .as_ref()
            .and_then(|runtime| runtime.try_borrow().ok().map(|r| r.evaluation_passes()))
            .unwrap_or(0)
    }

    pub fn take_diagnostics(&mut self) -> Vec<BindingDiagnostic> {
        self.runtime
            .as_ref()
            .and_then(|runtime| {
                runtime
                    .try_borrow_mut()
                    .ok()
                    .map(|mut r| r.engine.take_diagnostics())
            })
            .unwrap_or_default()
    }

    /// Bindable properties: the fixed ones plus the loaded model's joints.
    pub fn catalog(&self) -> &[PropertyDescriptor] {
        &self.catalog
    }

    pub fn frames_rendered(&self) -> u64 {
        self.render_loop.frames_rendered()
    }
}

impl Drop for ModelViewer {
    fn drop(&mut self) {
        self.release();
    }
}
