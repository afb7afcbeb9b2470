//! Named variable scope used for expression evaluation.
//!
//! Static variables are fixed at load. Device variables start absent and
//! take the last value seen in telemetry; an event that does not carry a
//! variable's path leaves its previous value in place.

use std::collections::HashMap;

use crate::config::{Variable, VariableTarget};
use crate::expression::{EvaluationError, EvaluationErrorKind};
use crate::telemetry::TelemetryEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScope {
    values: HashMap<String, f32>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the scope from the static variables.
    ///
    /// A literal that is not a finite number is logged and left out of the
    /// scope; it does not abort the load.
    pub fn load(variables: &[Variable]) -> Self {
        let mut scope = Self::new();
        for variable in variables.iter().filter(|v| v.target == VariableTarget::None) {
            match parse_literal(&variable.source) {
                Ok(value) => scope.set(&variable.name, value),
                Err(e) => log::warn!("Variable '{}' omitted: {}", variable.name, e),
            }
        }
        scope
    }

    /// Patch device variables from a telemetry event.
    ///
    /// Returns the number of entries updated.
    pub fn apply_telemetry(&mut self, variables: &[Variable], event: &TelemetryEvent) -> usize {
        let mut updated = 0;
        for variable in variables.iter().filter(|v| v.is_device()) {
            match event.value_at(&variable.source) {
                Some(value) => {
                    self.set(&variable.name, value);
                    updated += 1;
                }
                None => log::debug!(
                    "Telemetry event has no value at '{}'; keeping '{}'",
                    variable.source,
                    variable.name
                ),
            }
        }
        updated
    }

    pub fn set(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &f32)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

fn parse_literal(source: &str) -> Result<f32, EvaluationError> {
    source
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            EvaluationError::new(
                EvaluationErrorKind::TypeMismatch,
                format!("literal '{}' is not a number", source),
            )
        })
}
