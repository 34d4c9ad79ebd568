//! Argument list handed to the featurization script.
//!
//! The script takes a flat list of alternating `--key value` tokens.
//! [`ScriptArgs`] keeps them as ordered pairs so they can be validated
//! before being flattened for the service.

use crate::error::CoreError;
use crate::layout::{OutputLayout, INPUT_DIR, OUTPUT_DIR};

/// Ordered `--key value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptArgs {
    pairs: Vec<(String, String)>,
}

impl ScriptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. Keys must look like `--name` and appear once.
    pub fn push(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, CoreError> {
        let key = key.into();
        let name = key.strip_prefix("--").unwrap_or_default();
        if name.is_empty() || name.starts_with('-') || name.contains(char::is_whitespace) {
            return Err(CoreError::Validation(format!(
                "Script argument key '{key}' must have the form '--name'"
            )));
        }
        if self.get(&key).is_some() {
            return Err(CoreError::Validation(format!(
                "Duplicate script argument '{key}'"
            )));
        }
        self.pairs.push((key, value.into()));
        Ok(self)
    }

    /// Parse a flat token list back into pairs.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CoreError> {
        if tokens.len() % 2 != 0 {
            return Err(CoreError::Validation(format!(
                "Script arguments must be key/value pairs, got {} tokens",
                tokens.len()
            )));
        }
        let mut args = Self::new();
        for pair in tokens.chunks_exact(2) {
            args.push(pair[0].as_ref(), pair[1].as_ref())?;
        }
        Ok(args)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Flatten to `[key1, value1, key2, value2, ...]`.
    pub fn to_tokens(&self) -> Vec<String> {
        self.pairs
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect()
    }
}

/// Arguments understood by the TF-IDF featurization script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturizeArgs {
    pub input_bucket: String,
    pub input_key_prefix: String,
    pub output_bucket: String,
    pub output_key_prefix: String,
}

impl FeaturizeArgs {
    /// Read from the layout's raw input and write under its output root.
    pub fn for_layout(layout: &OutputLayout) -> Self {
        Self {
            input_bucket: layout.bucket().to_string(),
            input_key_prefix: format!("{}/{INPUT_DIR}", layout.prefix()),
            output_bucket: layout.bucket().to_string(),
            output_key_prefix: format!("{}/{OUTPUT_DIR}", layout.prefix()),
        }
    }

    pub fn to_args(&self) -> Result<ScriptArgs, CoreError> {
        let mut args = ScriptArgs::new();
        args.push("--s3_input_bucket", &self.input_bucket)?
            .push("--s3_input_key_prefix", &self.input_key_prefix)?
            .push("--s3_output_bucket", &self.output_bucket)?
            .push("--s3_output_key_prefix", &self.output_key_prefix)?;
        Ok(args)
    }
}
