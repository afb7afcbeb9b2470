//! Widget configuration.
//!
//! The persisted widget JSON is loose: most fields are optional and some
//! have legacy spellings. It is deserialized into raw structs and resolved
//! once into an immutable [`Configuration`] with every default applied, so
//! nothing downstream re-checks optional fields.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::{BACKGROUND_COLOR_LEN, DEFAULT_BACKGROUND_COLOR};
use crate::error::ConfigError;
use crate::property::PropertyBinding;

// ============================================================================
// Raw (persisted) configuration
// ============================================================================

/// Host envelope: the dashboard stores the selected device next to the
/// widget's own data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub device: Option<DeviceRef>,
    #[serde(default)]
    pub customwidgetdata: Option<WidgetData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceRef {
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetData {
    #[serde(default)]
    pub binary_id: Option<Value>,
    #[serde(default)]
    pub binary_name: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub advanced: Option<AdvancedData>,
    #[serde(default)]
    pub variables: Vec<RawVariable>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedData {
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub show_grid: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVariable {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, alias = "value")]
    pub source: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProperty {
    #[serde(default, alias = "name")]
    pub property_name: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Supported model formats, selected by the `modelType` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Collada,
    Obj,
    Gltf,
}

impl ModelType {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().to_ascii_lowercase().as_str() {
            ".dae" => Some(ModelType::Collada),
            ".obj" => Some(ModelType::Obj),
            ".gltf" => Some(ModelType::Gltf),
            _ => None,
        }
    }

    /// Derive the type from a file name, the way the upload form does.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let dot = file_name.rfind('.')?;
        Self::from_extension(&file_name[dot..])
    }

    pub fn extension(self) -> &'static str {
        match self {
            ModelType::Collada => ".dae",
            ModelType::Obj => ".obj",
            ModelType::Gltf => ".gltf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableTarget {
    /// Literal value fixed at load.
    None,
    /// Value read from device telemetry.
    Device,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub target: VariableTarget,
    /// Literal for `None`, `fragment.series` path for `Device`.
    pub source: String,
}

impl Variable {
    pub fn literal(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            target: VariableTarget::None,
            source: source.to_string(),
        }
    }

    pub fn device(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            target: VariableTarget::Device,
            source: path.to_string(),
        }
    }

    pub fn is_device(&self) -> bool {
        self.target == VariableTarget::Device
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    /// Always `#rrggbb`.
    pub background_color: String,
    pub show_grid: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            show_grid: false,
        }
    }
}

impl DisplaySettings {
    /// Background as linear 0..1 RGB components.
    pub fn background_rgb(&self) -> [f32; 3] {
        parse_hex_color(&self.background_color).unwrap_or([0.0, 0.0, 0.0])
    }
}

/// Fully resolved, immutable widget configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub device_id: Option<String>,
    pub binary_id: String,
    pub binary_name: Option<String>,
    pub model_type: ModelType,
    pub display: DisplaySettings,
    pub variables: Vec<Variable>,
    pub properties: Vec<PropertyBinding>,
}

impl Configuration {
    /// Parse either the host envelope (`{device, customwidgetdata}`) or bare
    /// widget data.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        let is_envelope = value
            .as_object()
            .map(|obj| obj.contains_key("customwidgetdata") || obj.contains_key("device"))
            .unwrap_or(false);

        if is_envelope {
            let host: HostConfig = serde_json::from_value(value)?;
            let device_id = host.device.and_then(|d| d.id).and_then(non_blank_value);
            let data = host.customwidgetdata.ok_or(ConfigError::MissingWidgetData)?;
            Self::resolve(data, device_id)
        } else {
            let data: WidgetData = serde_json::from_value(value)?;
            Self::resolve(data, None)
        }
    }

    /// Apply every default and validation rule once.
    ///
    /// Malformed variables and properties are logged and skipped; a missing
    /// binary or an unusable model type fails the whole configuration.
    pub fn resolve(data: WidgetData, device_id: Option<String>) -> Result<Self, ConfigError> {
        let device_id = device_id.filter(|id| !id.trim().is_empty());
        if device_id.is_none() {
            log::info!("Device id is blank; telemetry is disabled for this widget");
        }

        let binary_id = data
            .binary_id
            .and_then(non_blank_value)
            .ok_or(ConfigError::MissingBinaryId)?;

        let binary_name = data.binary_name.filter(|n| !n.trim().is_empty());
        let model_type = resolve_model_type(data.model_type.as_deref(), binary_name.as_deref())?;

        let display = resolve_display(data.advanced.unwrap_or_default());
        let variables = resolve_variables(data.variables);
        let properties = resolve_properties(data.properties);

        Ok(Self {
            device_id,
            binary_id,
            binary_name,
            model_type,
            display,
            variables,
            properties,
        })
    }

    pub fn has_device_variables(&self) -> bool {
        self.variables.iter().any(Variable::is_device)
    }

    /// The device to subscribe to: only when a device is selected and at
    /// least one variable reads telemetry.
    pub fn subscription_device(&self) -> Option<&str> {
        if self.has_device_variables() {
            self.device_id.as_deref()
        } else {
            None
        }
    }
}

fn non_blank_value(value: Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_model_type(
    model_type: Option<&str>,
    binary_name: Option<&str>,
) -> Result<ModelType, ConfigError> {
    match model_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(declared) => ModelType::from_extension(declared)
            .ok_or_else(|| ConfigError::UnsupportedModelType(declared.to_string())),
        None => {
            let name = binary_name.ok_or(ConfigError::MissingModelType)?;
            let derived = ModelType::from_file_name(name).ok_or(ConfigError::MissingModelType)?;
            log::warn!(
                "Model type is missing; using {} from binary name '{}'",
                derived.extension(),
                name
            );
            Ok(derived)
        }
    }
}

fn hex_color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid colour pattern"))
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"))
}

fn device_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^.\s]+\.[^.\s]+$").expect("valid path pattern"))
}

/// Truncate to `#rrggbb`; anything that is then not a hex colour falls
/// back to the default.
pub fn normalize_background_color(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        log::info!("Background color is not set; using {}", DEFAULT_BACKGROUND_COLOR);
        return DEFAULT_BACKGROUND_COLOR.to_string();
    };

    let truncated: String = raw.chars().take(BACKGROUND_COLOR_LEN).collect();
    if hex_color_pattern().is_match(&truncated) {
        truncated
    } else {
        log::warn!(
            "Background color '{}' is not a #rrggbb colour; using {}",
            raw,
            DEFAULT_BACKGROUND_COLOR
        );
        DEFAULT_BACKGROUND_COLOR.to_string()
    }
}

/// Only the literal string `"true"` enables the grid.
pub fn parse_show_grid(raw: Option<&Value>) -> bool {
    matches!(raw, Some(Value::String(s)) if s == "true")
}

fn parse_hex_color(color: &str) -> Option<[f32; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(hex.get(range)?, 16)
            .ok()
            .map(|c| c as f32 / 255.0)
    };
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

fn resolve_display(advanced: AdvancedData) -> DisplaySettings {
    DisplaySettings {
        background_color: normalize_background_color(advanced.background_color.as_deref()),
        show_grid: parse_show_grid(advanced.show_grid.as_ref()),
    }
}

fn resolve_variable(index: usize, raw: RawVariable) -> Result<Variable, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidVariable { index, reason };

    let name = raw.name.map(|n| n.trim().to_string()).unwrap_or_default();
    if !identifier_pattern().is_match(&name) {
        return Err(invalid(format!("name '{}' is not an identifier", name)));
    }

    let target = match raw.target.as_deref().map(str::trim) {
        None | Some("") => VariableTarget::None,
        Some(t) if t.eq_ignore_ascii_case("none") => VariableTarget::None,
        Some(t) if t.eq_ignore_ascii_case("device") => VariableTarget::Device,
        Some(other) => return Err(invalid(format!("unknown target '{}'", other))),
    };

    let source = match raw.source {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => return Err(invalid(format!("source {} is not a string or number", other))),
    };

    if target == VariableTarget::Device && !device_path_pattern().is_match(&source) {
        return Err(invalid(format!(
            "device source '{}' is not a fragment.series path",
            source
        )));
    }

    Ok(Variable { name, target, source })
}

fn resolve_variables(raw: Vec<RawVariable>) -> Vec<Variable> {
    let mut variables: Vec<Variable> = Vec::with_capacity(raw.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, raw_variable) in raw.into_iter().enumerate() {
        let variable = match resolve_variable(index, raw_variable) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Skipping variable: {}", e);
                continue;
            }
        };

        // Later declarations win.
        if let Some(&previous) = positions.get(&variable.name) {
            log::warn!(
                "Variable '{}' is declared more than once; the later declaration (#{}) is used",
                variable.name,
                index
            );
            variables[previous] = variable;
        } else {
            positions.insert(variable.name.clone(), variables.len());
            variables.push(variable);
        }
    }

    variables
}

fn resolve_properties(raw: Vec<RawProperty>) -> Vec<PropertyBinding> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, property)| {
            let name = property.property_name.unwrap_or_default();
            if name.trim().is_empty() {
                let err = ConfigError::InvalidProperty {
                    index,
                    reason: "property name is blank".to_string(),
                };
                log::warn!("Skipping property: {}", err);
                return None;
            }
            Some(PropertyBinding::new(&name, property.expression.unwrap_or_default()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{BuiltinProperty, PropertyTarget};
    use serde_json::json;

    fn widget(value: Value) -> Configuration {
        Configuration::from_json(&value.to_string()).unwrap()
    }

    #[test]
    fn test_background_truncated_to_seven_chars() {
        assert_eq!(normalize_background_color(Some("#112233extra")), "#112233");
        assert_eq!(normalize_background_color(Some("#112233")), "#112233");
    }

    #[test]
    fn test_background_defaults() {
        assert_eq!(normalize_background_color(None), DEFAULT_BACKGROUND_COLOR);
        assert_eq!(normalize_background_color(Some("")), DEFAULT_BACKGROUND_COLOR);
        assert_eq!(normalize_background_color(Some("red")), DEFAULT_BACKGROUND_COLOR);
    }

    #[test]
    fn test_show_grid_only_literal_true() {
        assert!(parse_show_grid(Some(&json!("true"))));
        assert!(!parse_show_grid(Some(&json!("false"))));
        assert!(!parse_show_grid(Some(&json!("yes"))));
        assert!(!parse_show_grid(Some(&json!(true))));
        assert!(!parse_show_grid(None));
    }

    #[test]
    fn test_background_rgb() {
        let display = DisplaySettings {
            background_color: "#ff0080".to_string(),
            show_grid: false,
        };
        let rgb = display.background_rgb();
        assert_eq!(rgb[0], 1.0);
        assert_eq!(rgb[1], 0.0);
        assert!((rgb[2] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_with_legacy_keys() {
        let config = widget(json!({
            "device": { "id": "4711" },
            "customwidgetdata": {
                "binaryId": "123",
                "binaryName": "robot.dae",
                "modelType": ".dae",
                "advanced": { "backgroundColor": "#112233ff", "showGrid": "true" },
                "variables": [
                    { "name": "size", "target": "none", "value": "1" },
                    { "name": "speed", "target": "device", "value": "c8y_Speed.value" }
                ],
                "properties": [
                    { "name": "Scale", "expression": "size" },
                    { "name": "joint_1", "expression": "speed * 10" }
                ]
            }
        }));

        assert_eq!(config.device_id.as_deref(), Some("4711"));
        assert_eq!(config.binary_id, "123");
        assert_eq!(config.model_type, ModelType::Collada);
        assert_eq!(config.display.background_color, "#112233");
        assert!(config.display.show_grid);
        assert_eq!(config.variables[0], Variable::literal("size", "1"));
        assert_eq!(config.variables[1], Variable::device("speed", "c8y_Speed.value"));
        assert_eq!(
            config.properties[0].target(),
            &PropertyTarget::Builtin(BuiltinProperty::Scale)
        );
        assert_eq!(config.properties[1].target(), &PropertyTarget::Joint("joint_1".to_string()));
        assert_eq!(config.subscription_device(), Some("4711"));
    }

    #[test]
    fn test_bare_widget_data() {
        let config = widget(json!({
            "binaryId": "9",
            "modelType": ".obj",
            "variables": [{ "name": "size", "target": "none", "source": 2 }],
            "properties": [{ "propertyName": "Scale", "expression": "size" }]
        }));

        assert_eq!(config.device_id, None);
        assert_eq!(config.variables[0].source, "2");
        assert_eq!(config.properties[0].property_name(), "Scale");
        assert_eq!(config.display, DisplaySettings::default());
    }

    #[test]
    fn test_missing_binary_id_is_terminal() {
        let err = Configuration::from_json(r#"{"modelType": ".obj"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBinaryId));

        let err = Configuration::from_json(r#"{"binaryId": "  ", "modelType": ".obj"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBinaryId));
    }

    #[test]
    fn test_missing_envelope_data() {
        let err = Configuration::from_json(r#"{"device": {"id": "1"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingWidgetData));
    }

    #[test]
    fn test_model_type_resolution() {
        let err = Configuration::from_json(r#"{"binaryId": "1", "modelType": ".stl"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedModelType(t) if t == ".stl"));

        let config = widget(json!({ "binaryId": "1", "binaryName": "Arm.GLTF" }));
        assert_eq!(config.model_type, ModelType::Gltf);

        let err = Configuration::from_json(r#"{"binaryId": "1"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingModelType));

        assert_eq!(ModelType::from_extension(" .OBJ "), Some(ModelType::Obj));
    }

    #[test]
    fn test_invalid_variables_are_skipped() {
        let config = widget(json!({
            "binaryId": "1",
            "modelType": ".obj",
            "variables": [
                { "name": "has space", "target": "none", "value": "1" },
                { "name": "x", "target": "sensor", "value": "1" },
                { "name": "y", "target": "device", "value": "nodot" },
                { "name": "z", "target": "none", "value": "3" }
            ]
        }));

        assert_eq!(config.variables, vec![Variable::literal("z", "3")]);
        assert!(!config.has_device_variables());
    }

    #[test]
    fn test_duplicate_variables_keep_last() {
        let config = widget(json!({
            "binaryId": "1",
            "modelType": ".obj",
            "variables": [
                { "name": "a", "target": "none", "value": "1" },
                { "name": "b", "target": "none", "value": "2" },
                { "name": "a", "target": "none", "value": "5" }
            ]
        }));

        assert_eq!(
            config.variables,
            vec![Variable::literal("a", "5"), Variable::literal("b", "2")]
        );
    }

    #[test]
    fn test_blank_property_names_skipped() {
        let config = widget(json!({
            "binaryId": "1",
            "modelType": ".obj",
            "properties": [
                { "name": "", "expression": "1" },
                { "name": "Position X", "expression": "1" }
            ]
        }));
        assert_eq!(config.properties.len(), 1);
        assert_eq!(config.properties[0].property_name(), "Position X");
    }

    #[test]
    fn test_no_subscription_without_device_variables() {
        let config = widget(json!({
            "device": { "id": "4711" },
            "customwidgetdata": { "binaryId": "1", "modelType": ".obj" }
        }));
        assert_eq!(config.device_id.as_deref(), Some("4711"));
        assert_eq!(config.subscription_device(), None);
    }
}
