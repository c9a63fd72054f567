//! Configuration types for script transforms.

use serde::{Deserialize, Serialize};
use sf_error::ConfigError;

/// Option naming the script engine.
pub const ENGINE_NAME_CONFIG: &str = "engine-name";

/// Option holding the source text that defines `keyTransform`.
pub const KEY_SCRIPT_CONFIG: &str = "key-script";

/// Option holding the source text that defines `valueTransform`.
pub const VALUE_SCRIPT_CONFIG: &str = "value-script";

/// Configuration for a script transformer.
///
/// Deserializes from the same kebab-case keys the option map uses; any other
/// keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransformerConfig {
    /// Registered engine name (case-sensitive).
    pub engine_name: String,

    /// Source defining `keyTransform`. `None` passes the key through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_script: Option<String>,

    /// Source defining `valueTransform`. `None` passes the value through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_script: Option<String>,
}

impl TransformerConfig {
    /// Creates a pass-through config for the given engine.
    pub fn new(engine_name: impl Into<String>) -> Self {
        Self {
            engine_name: engine_name.into(),
            key_script: None,
            value_script: None,
        }
    }

    /// Sets the key script.
    pub fn with_key_script(mut self, script: impl Into<String>) -> Self {
        self.key_script = Some(script.into());
        self
    }

    /// Sets the value script.
    pub fn with_value_script(mut self, script: impl Into<String>) -> Self {
        self.value_script = Some(script.into());
        self
    }

    /// Builds a config from a string option map.
    ///
    /// Keys other than [`ENGINE_NAME_CONFIG`], [`KEY_SCRIPT_CONFIG`] and
    /// [`VALUE_SCRIPT_CONFIG`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingOption`] if `engine-name` is absent or blank.
    pub fn from_options<I, K, V>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut engine_name = None;
        let mut key_script = None;
        let mut value_script = None;

        for (key, value) in options {
            match key.as_ref() {
                ENGINE_NAME_CONFIG => engine_name = Some(value.into()),
                KEY_SCRIPT_CONFIG => key_script = Some(value.into()),
                VALUE_SCRIPT_CONFIG => value_script = Some(value.into()),
                _ => {}
            }
        }

        let config = Self {
            engine_name: engine_name.ok_or(ConfigError::MissingOption(ENGINE_NAME_CONFIG))?,
            key_script,
            value_script,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the engine name is present.
    ///
    /// Whether the engine is registered is checked against a registry when
    /// the transformer is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_name.trim().is_empty() {
            return Err(ConfigError::MissingOption(ENGINE_NAME_CONFIG));
        }
        Ok(())
    }

    /// Returns the key script, treating blank text as absent.
    pub fn effective_key_script(&self) -> Option<&str> {
        non_blank(self.key_script.as_deref())
    }

    /// Returns the value script, treating blank text as absent.
    pub fn effective_value_script(&self) -> Option<&str> {
        non_blank(self.value_script.as_deref())
    }

    /// Returns true if neither script is present.
    pub fn is_passthrough(&self) -> bool {
        self.effective_key_script().is_none() && self.effective_value_script().is_none()
    }
}

fn non_blank(script: Option<&str>) -> Option<&str> {
    script.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options() {
        let config = TransformerConfig::from_options([
            ("engine-name", "lua"),
            ("value-script", "function valueTransform(v) return v end"),
            ("unrelated.option", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.engine_name, "lua");
        assert!(config.key_script.is_none());
        assert!(config.value_script.is_some());
        assert!(!config.is_passthrough());
    }

    #[test]
    fn test_from_options_missing_engine() {
        let result = TransformerConfig::from_options([("key-script", "x")]);
        assert!(matches!(
            result,
            Err(ConfigError::MissingOption(ENGINE_NAME_CONFIG))
        ));

        let result = TransformerConfig::from_options([("engine-name", "  ")]);
        assert!(matches!(result, Err(ConfigError::MissingOption(_))));
    }

    #[test]
    fn test_blank_scripts_are_passthrough() {
        let config = TransformerConfig::new("rhai")
            .with_key_script("")
            .with_value_script("  \n");
        assert!(config.is_passthrough());
        assert!(config.effective_key_script().is_none());
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{
            "engine-name": "javascript",
            "key-script": "function keyTransform(k) { return k + '123'; }",
            "comment": "unknown keys are ignored"
        }"#;
        let config: TransformerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.engine_name, "javascript");
        assert!(config.key_script.is_some());
        assert!(config.value_script.is_none());

        let round = serde_json::to_string(&config).unwrap();
        assert!(round.contains("\"engine-name\""));
        assert!(!round.contains("value-script"));
    }
}
