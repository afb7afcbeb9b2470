//! Property bindings and the property-name dispatch table.
//!
//! A binding pairs a property name with an expression. Names found in the
//! built-in table drive the model group, the animation mixer or the camera
//! orbit; every other name addresses a kinematic joint.

use std::f32::consts::PI;

use serde::Serialize;

use crate::error::JointError;
use crate::scene::kinematics::Kinematics;
use crate::scene::SceneAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The fixed set of scene properties a binding can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuiltinProperty {
    Position(Axis),
    Rotation(Axis),
    /// Uniform scale applied to all three axes.
    Scale,
    AnimationSpeed,
    OrbitSpeed,
}

/// Property names are matched exactly (case-sensitive).
const BUILTIN_PROPERTIES: &[(&str, BuiltinProperty)] = &[
    ("Position X", BuiltinProperty::Position(Axis::X)),
    ("Position Y", BuiltinProperty::Position(Axis::Y)),
    ("Position Z", BuiltinProperty::Position(Axis::Z)),
    ("Rotation X", BuiltinProperty::Rotation(Axis::X)),
    ("Rotation Y", BuiltinProperty::Rotation(Axis::Y)),
    ("Rotation Z", BuiltinProperty::Rotation(Axis::Z)),
    ("Scale", BuiltinProperty::Scale),
    ("Animation Speed", BuiltinProperty::AnimationSpeed),
    ("Orbit Speed", BuiltinProperty::OrbitSpeed),
];

impl BuiltinProperty {
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTIN_PROPERTIES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, property)| *property)
    }

    pub fn name(self) -> &'static str {
        BUILTIN_PROPERTIES
            .iter()
            .find(|(_, property)| *property == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    /// Apply a value to the scene.
    ///
    /// Returns false when the property has nothing to act on (animation speed
    /// on a model without clips).
    pub fn apply(self, scene: &mut dyn SceneAdapter, value: f32) -> bool {
        match self {
            BuiltinProperty::Position(axis) => scene.set_position(axis, value),
            BuiltinProperty::Rotation(axis) => scene.set_rotation(axis, value),
            BuiltinProperty::Scale => scene.set_scale(value),
            BuiltinProperty::AnimationSpeed => return scene.set_animation_speed(value),
            BuiltinProperty::OrbitSpeed => scene.set_orbit_speed(value),
        }
        true
    }
}

/// What a binding writes to.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyTarget {
    Builtin(BuiltinProperty),
    Joint(String),
}

impl PropertyTarget {
    pub fn from_name(name: &str) -> Self {
        match BuiltinProperty::lookup(name) {
            Some(property) => PropertyTarget::Builtin(property),
            None => PropertyTarget::Joint(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PropertyTarget::Builtin(property) => property.name(),
            PropertyTarget::Joint(name) => name,
        }
    }

    pub fn apply(&self, scene: &mut dyn SceneAdapter, value: f32) -> Result<bool, JointError> {
        match self {
            PropertyTarget::Builtin(property) => Ok(property.apply(scene, value)),
            PropertyTarget::Joint(name) => scene.set_joint_value(name, value).map(|_| true),
        }
    }
}

/// A named property driven by an arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBinding {
    target: PropertyTarget,
    expression: String,
}

impl PropertyBinding {
    pub fn new(property_name: &str, expression: impl Into<String>) -> Self {
        Self {
            target: PropertyTarget::from_name(property_name),
            expression: expression.into(),
        }
    }

    pub fn target(&self) -> &PropertyTarget {
        &self.target
    }

    pub fn property_name(&self) -> &str {
        self.target.name()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

// ============================================================================
// Property catalog
// ============================================================================

/// Describes a bindable property for configuration tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub group: String,
    pub name: String,
    pub default_value: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

impl PropertyDescriptor {
    fn new(group: &str, name: &str, default_value: f32) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            default_value,
            min: None,
            max: None,
        }
    }

    fn with_range(mut self, min: Option<f32>, max: Option<f32>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// The fixed properties, grouped the way the configuration form lists them.
pub fn builtin_catalog() -> Vec<PropertyDescriptor> {
    BUILTIN_PROPERTIES
        .iter()
        .map(|(name, property)| match property {
            BuiltinProperty::Position(_) => PropertyDescriptor::new("Position", name, 0.0),
            BuiltinProperty::Rotation(_) => {
                PropertyDescriptor::new("Rotation", name, 0.0).with_range(Some(-PI), Some(PI))
            }
            BuiltinProperty::Scale => {
                PropertyDescriptor::new("Scale", name, 1.0).with_range(Some(0.0), None)
            }
            BuiltinProperty::AnimationSpeed => PropertyDescriptor::new("Animation", name, 1.0),
            BuiltinProperty::OrbitSpeed => PropertyDescriptor::new("Camera", name, 1.0),
        })
        .collect()
}

/// One descriptor per non-static joint, in the model's declaration order.
pub fn joint_catalog(kinematics: &Kinematics) -> Vec<PropertyDescriptor> {
    kinematics
        .joints()
        .filter(|joint| !joint.is_static())
        .map(|joint| {
            PropertyDescriptor::new("Kinematics", joint.name(), joint.zero_position())
                .with_range(Some(joint.limits().min), Some(joint.limits().max))
        })
        .collect()
}
