//! Structured binding diagnostics.
//!
//! Every failed binding produces a JSON-serializable diagnostic so a host
//! can surface problems without reading logs. Logging is warn-once: a
//! binding that keeps failing the same way is logged on the first failure
//! only, and a successful evaluation re-arms it.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::error::JointError;
use crate::expression::{EvaluationError, EvaluationErrorKind};

/// Diagnostics kept before the oldest are dropped.
pub const MAX_DIAGNOSTICS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnknownVariable,
    SyntaxError,
    DivisionByZero,
    TypeMismatch,
    UnknownJoint,
    /// The joint exists but cannot move.
    StaticJoint,
    /// The value is outside the joint limits and was not applied.
    JointOutOfRange,
}

impl From<EvaluationErrorKind> for DiagnosticKind {
    fn from(kind: EvaluationErrorKind) -> Self {
        match kind {
            EvaluationErrorKind::UnknownVariable => DiagnosticKind::UnknownVariable,
            EvaluationErrorKind::SyntaxError => DiagnosticKind::SyntaxError,
            EvaluationErrorKind::DivisionByZero => DiagnosticKind::DivisionByZero,
            EvaluationErrorKind::TypeMismatch => DiagnosticKind::TypeMismatch,
            EvaluationErrorKind::UnknownJoint => DiagnosticKind::UnknownJoint,
        }
    }
}

/// Why a binding did not reach the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingFailure {
    Evaluation(EvaluationError),
    Joint(JointError),
}

impl BindingFailure {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            BindingFailure::Evaluation(e) => e.kind.into(),
            BindingFailure::Joint(JointError::NotFound(_)) => DiagnosticKind::UnknownJoint,
            BindingFailure::Joint(JointError::Static(_)) => DiagnosticKind::StaticJoint,
            BindingFailure::Joint(JointError::OutOfRange { .. }) => DiagnosticKind::JointOutOfRange,
        }
    }

    pub fn message(&self) -> String {
        match self {
            BindingFailure::Evaluation(e) => e.message.clone(),
            BindingFailure::Joint(e) => e.to_string(),
        }
    }
}

impl From<JointError> for BindingFailure {
    /// A missing joint is an evaluation error; the other joint errors are
    /// rejections by the model.
    fn from(err: JointError) -> Self {
        match err {
            JointError::NotFound(name) => BindingFailure::Evaluation(EvaluationError::new(
                EvaluationErrorKind::UnknownJoint,
                format!("joint '{}' does not exist", name),
            )),
            other => BindingFailure::Joint(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingDiagnostic {
    /// Position of the binding in declaration order.
    pub index: usize,
    pub property: String,
    pub expression: String,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Evaluation pass that produced it (1-based).
    pub pass: u64,
}

#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: VecDeque<BindingDiagnostic>,
    warned: HashSet<(usize, DiagnosticKind)>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: BindingDiagnostic) {
        if self.warned.insert((diagnostic.index, diagnostic.kind)) {
            log::warn!(
                "Property '{}' = '{}' failed ({:?}): {}",
                diagnostic.property,
                diagnostic.expression,
                diagnostic.kind,
                diagnostic.message
            );
        } else {
            log::debug!(
                "Property '{}' still failing: {}",
                diagnostic.property,
                diagnostic.message
            );
        }

        if self.entries.len() == MAX_DIAGNOSTICS {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    /// Re-arm warnings for a binding after it evaluated successfully.
    pub fn clear_binding(&mut self, index: usize) {
        self.warned.retain(|(i, _)| *i != index);
    }

    /// Drain the queued diagnostics, oldest first.
    pub fn take(&mut self) -> Vec<BindingDiagnostic> {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingDiagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the next failure of this kind for `index` would be logged.
    pub fn is_armed(&self, index: usize, kind: DiagnosticKind) -> bool {
        !self.warned.contains(&(index, kind))
    }
}
