//! Articulated joints.
//!
//! Revolute values are in degrees, prismatic values in model units. A joint
//! whose limits collapse (`min >= max`) is static and cannot be driven.
//!
//! A joint bound to a scene node replaces one transform step of that node
//! with its own motion: a rotation about the joint axis, or a translation
//! along it.

use glam::Vec3;
use serde::Serialize;

use super::graph::{StepTarget, TransformStep};
use crate::error::JointError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Revolute,
    Prismatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointLimits {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Joint {
    name: String,
    kind: JointKind,
    axis: [f32; 3],
    limits: JointLimits,
    zero_position: f32,
    value: f32,
    #[serde(skip)]
    target: Option<StepTarget>,
}

impl Joint {
    pub fn new(name: impl Into<String>, kind: JointKind, axis: [f32; 3], limits: JointLimits) -> Self {
        Self {
            name: name.into(),
            kind,
            axis,
            limits,
            zero_position: 0.0,
            value: 0.0,
            target: None,
        }
    }

    /// Bind the joint to the node step it moves.
    pub fn with_target(mut self, target: StepTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn target(&self) -> Option<StepTarget> {
        self.target
    }

    /// The transform step for the current value.
    pub fn motion(&self) -> TransformStep {
        let axis = Vec3::from(self.axis).normalize_or_zero();
        match self.kind {
            JointKind::Revolute => TransformStep::AxisAngle(axis, self.value.to_radians()),
            JointKind::Prismatic => TransformStep::Translate(axis * self.value),
        }
    }

    pub fn with_zero_position(mut self, zero_position: f32) -> Self {
        self.zero_position = zero_position;
        self.value = zero_position;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn axis(&self) -> [f32; 3] {
        self.axis
    }

    pub fn limits(&self) -> JointLimits {
        self.limits
    }

    pub fn zero_position(&self) -> f32 {
        self.zero_position
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_static(&self) -> bool {
        self.limits.min >= self.limits.max
    }
}

/// The joints of one model, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kinematics {
    joints: Vec<Joint>,
}

impl Kinematics {
    pub fn new(joints: Vec<Joint>) -> Self {
        Self { joints }
    }

    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter()
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Set a joint value. Nothing changes on error.
    pub fn set_joint_value(&mut self, name: &str, value: f32) -> Result<(), JointError> {
        let joint = self
            .joints
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or_else(|| JointError::NotFound(name.to_string()))?;

        if joint.is_static() {
            return Err(JointError::Static(name.to_string()));
        }

        let JointLimits { min, max } = joint.limits;
        if !(min..=max).contains(&value) {
            return Err(JointError::OutOfRange {
                name: name.to_string(),
                value,
                min,
                max,
            });
        }

        joint.value = value;
        Ok(())
    }
}
