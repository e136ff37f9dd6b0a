//! Named string parameters (build parameters and projected job parameters).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Add a parameter, replacing the value in place if the name already exists.
pub fn add_parameter(params: &mut Vec<Parameter>, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match params.iter_mut().find(|p| p.name == name) {
        Some(existing) => existing.value = value,
        None => params.push(Parameter { name, value }),
    }
}

/// Look up a parameter value by name.
pub fn parameter_value<'a>(params: &'a [Parameter], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.value.as_str())
}
