//! Property evaluation.
//!
//! A pass evaluates every binding in declaration order and writes each
//! result to the scene immediately, so a later binding sees the effects of
//! earlier ones. A failing binding is recorded and skipped; the pass always
//! reaches the end of the list.

use serde::Serialize;

use crate::diagnostics::{BindingDiagnostic, BindingFailure, DiagnosticLog};
use crate::expression::ExpressionEvaluator;
use crate::property::PropertyBinding;
use crate::scene::SceneAdapter;
use crate::scope::VariableScope;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedProperty {
    pub index: usize,
    pub property: String,
    pub value: f32,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub applied: Vec<AppliedProperty>,
    /// Bindings that evaluated but had nothing to act on.
    pub ignored: Vec<usize>,
    pub failures: Vec<(usize, BindingFailure)>,
}

impl EvaluationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
pub struct PropertyEvaluationEngine {
    evaluator: ExpressionEvaluator,
    diagnostics: DiagnosticLog,
    passes: u64,
}

impl PropertyEvaluationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every binding against `scope` and apply the results.
    pub fn run(
        &mut self,
        bindings: &[PropertyBinding],
        scope: &VariableScope,
        scene: &mut dyn SceneAdapter,
    ) -> EvaluationReport {
        self.passes += 1;
        let mut report = EvaluationReport::default();

        for (index, binding) in bindings.iter().enumerate() {
            let outcome = self
                .evaluator
                .evaluate(binding.expression(), scope)
                .map_err(BindingFailure::Evaluation)
                .and_then(|value| {
                    binding
                        .target()
                        .apply(scene, value)
                        .map(|acted| (value, acted))
                        .map_err(BindingFailure::from)
                });

            match outcome {
                Ok((value, true)) => {
                    self.diagnostics.clear_binding(index);
                    report.applied.push(AppliedProperty {
                        index,
                        property: binding.property_name().to_string(),
                        value,
                    });
                }
                Ok((_, false)) => {
                    self.diagnostics.clear_binding(index);
                    log::debug!(
                        "Property '{}' has nothing to act on in this model",
                        binding.property_name()
                    );
                    report.ignored.push(index);
                }
                Err(failure) => {
                    self.diagnostics.record(BindingDiagnostic {
                        index,
                        property: binding.property_name().to_string(),
                        expression: binding.expression().to_string(),
                        kind: failure.kind(),
                        message: failure.message(),
                        pass: self.passes,
                    });
                    report.failures.push((index, failure));
                }
            }
        }

        report
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<BindingDiagnostic> {
        self.diagnostics.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::error::JointError;
    use crate::property::Axis;
    use crate::scene::SceneSnapshot;

    /// Records every mutation in call order.
    #[derive(Default)]
    struct RecordingScene {
        calls: Vec<String>,
        joints: Vec<&'static str>,
        has_mixer: bool,
    }

    impl SceneAdapter for RecordingScene {
        fn set_position(&mut self, axis: Axis, value: f32) {
            self.calls.push(format!("position {:?} {}", axis, value));
        }
        fn set_rotation(&mut self, axis: Axis, value: f32) {
            self.calls.push(format!("rotation {:?} {}", axis, value));
        }
        fn set_scale(&mut self, value: f32) {
            self.calls.push(format!("scale {}", value));
        }
        fn set_animation_speed(&mut self, value: f32) -> bool {
            self.calls.push(format!("animation {}", value));
            self.has_mixer
        }
        fn set_orbit_speed(&mut self, value: f32) {
            self.calls.push(format!("orbit {}", value));
        }
        fn set_joint_value(&mut self, name: &str, value: f32) -> Result<(), JointError> {
            if self.joints.iter().any(|j| *j == name) {
                self.calls.push(format!("joint {} {}", name, value));
                Ok(())
            } else {
                Err(JointError::NotFound(name.to_string()))
            }
        }
        fn advance(&mut self, _delta: f32) {}
        fn render(&mut self) {}
        fn resize(&mut self, _width: u32, _height: u32) {}
        fn snapshot(&self) -> SceneSnapshot {
            unimplemented!()
        }
    }

    fn scope() -> VariableScope {
        let mut scope = VariableScope::new();
        scope.set("size", 2.0);
        scope.set("speed", 3.0);
        scope
    }

    #[test]
    fn test_bindings_apply_in_declaration_order() {
        let bindings = vec![
            PropertyBinding::new("Scale", "size"),
            PropertyBinding::new("Position X", "size + 1"),
            PropertyBinding::new("Orbit Speed", "speed"),
        ];
        let mut scene = RecordingScene::default();
        let mut engine = PropertyEvaluationEngine::new();

        let report = engine.run(&bindings, &scope(), &mut scene);

        assert!(report.is_clean());
        assert_eq!(scene.calls, ["scale 2", "position X 3", "orbit 3"]);
        assert_eq!(report.applied[1].property, "Position X");
    }

    #[test]
    fn test_failure_does_not_stop_later_bindings() {
        let bindings = vec![
            PropertyBinding::new("Position X", "missing * 2"),
            PropertyBinding::new("Position Y", "size / 0"),
            PropertyBinding::new("elbow", "size"),
            PropertyBinding::new("Position Z", "size"),
        ];
        let mut scene = RecordingScene::default();
        let mut engine = PropertyEvaluationEngine::new();

        let report = engine.run(&bindings, &scope(), &mut scene);

        assert_eq!(scene.calls, ["position Z 2"]);
        let kinds: Vec<DiagnosticKind> = report.failures.iter().map(|(_, f)| f.kind()).collect();
        assert_eq!(
            kinds,
            [
                DiagnosticKind::UnknownVariable,
                DiagnosticKind::DivisionByZero,
                DiagnosticKind::UnknownJoint
            ]
        );
        assert_eq!(engine.diagnostics().len(), 3);
    }

    #[test]
    fn test_joint_bindings() {
        let bindings = vec![PropertyBinding::new("elbow", "size * 10")];
        let mut scene = RecordingScene {
            joints: vec!["elbow"],
            ..Default::default()
        };

        let report = PropertyEvaluationEngine::new().run(&bindings, &scope(), &mut scene);
        assert!(report.is_clean());
        assert_eq!(scene.calls, ["joint elbow 20"]);
    }

    #[test]
    fn test_animation_speed_without_mixer_is_ignored() {
        let bindings = vec![PropertyBinding::new("Animation Speed", "2")];
        let mut scene = RecordingScene::default();

        let report = PropertyEvaluationEngine::new().run(&bindings, &scope(), &mut scene);
        assert!(report.is_clean());
        assert!(report.applied.is_empty());
        assert_eq!(report.ignored, [0]);
    }

    #[test]
    fn test_recovery_rearms_warning() {
        let bindings = vec![PropertyBinding::new("Scale", "late")];
        let mut scene = RecordingScene::default();
        let mut engine = PropertyEvaluationEngine::new();
        let mut scope = scope();

        engine.run(&bindings, &scope, &mut scene);
        engine.run(&bindings, &scope, &mut scene);
        assert!(!engine
            .diagnostics()
            .is_armed(0, DiagnosticKind::UnknownVariable));

        scope.set("late", 1.0);
        engine.run(&bindings, &scope, &mut scene);
        assert!(engine
            .diagnostics()
            .is_armed(0, DiagnosticKind::UnknownVariable));

        let diagnostics = engine.take_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[1].pass, 2);
        assert_eq!(engine.passes(), 3);
    }
}
