//! Build parameter interpolation.
//!
//! Requirement templates reference build parameters with `${name}`, where
//! `name` is a dotted parameter name such as `cds.project` or
//! `git.branch`. Interpolation is strict: an unknown name or a malformed
//! placeholder is an error rather than being left in the output, so
//! unresolved state never reaches a worker.

use hatchway_core::parameter::Parameter;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::InterpolationError;

// `${` up to the next brace; group 2 is absent when the placeholder is unterminated
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]*)(\})?").unwrap());

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*(?:\.[a-zA-Z_][a-zA-Z0-9_-]*)*$").unwrap()
});

/// Parameters available for interpolation, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ParameterContext {
    values: HashMap<String, String>,
}

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a parameter list. Later duplicates win.
    pub fn from_parameters(params: &[Parameter]) -> Self {
        let values = params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        Self { values }
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitute every placeholder in `input`.
    ///
    /// Returns the first failure encountered, scanning left to right.
    pub fn interpolate(&self, input: &str) -> Result<String, InterpolationError> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for caps in PLACEHOLDER_REGEX.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = &caps[1];

            if caps.get(2).is_none() || !NAME_REGEX.is_match(name) {
                return Err(InterpolationError::Malformed {
                    placeholder: whole.as_str().to_string(),
                    input: input.to_string(),
                });
            }

            let value = self
                .resolve(name)
                .ok_or_else(|| InterpolationError::Unresolved {
                    name: name.to_string(),
                    input: input.to_string(),
                })?;

            output.push_str(&input[last..whole.start()]);
            output.push_str(value);
            last = whole.end();
        }

        output.push_str(&input[last..]);
        Ok(output)
    }
}
