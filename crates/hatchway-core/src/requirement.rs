//! Job requirements.
//!
//! A job declares requirement *templates* whose name and value may reference
//! build parameters. Once interpolated they become plain [`Requirement`]s that
//! hatcheries match against their capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of constraint a requirement expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementType {
    Binary,
    Network,
    Model,
    Hostname,
    Plugin,
    /// A sidecar the executing context must provision alongside the job.
    Service,
    Memory,
    Os,
    OsArchitecture,
    Volume,
}

impl RequirementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::Binary => "binary",
            RequirementType::Network => "network",
            RequirementType::Model => "model",
            RequirementType::Hostname => "hostname",
            RequirementType::Plugin => "plugin",
            RequirementType::Service => "service",
            RequirementType::Memory => "memory",
            RequirementType::Os => "os",
            RequirementType::OsArchitecture => "os-architecture",
            RequirementType::Volume => "volume",
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown requirement type: {0:?}")]
pub struct ParseRequirementTypeError(pub String);

impl FromStr for RequirementType {
    type Err = ParseRequirementTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [RequirementType; 10] = [
            RequirementType::Binary,
            RequirementType::Network,
            RequirementType::Model,
            RequirementType::Hostname,
            RequirementType::Plugin,
            RequirementType::Service,
            RequirementType::Memory,
            RequirementType::Os,
            RequirementType::OsArchitecture,
            RequirementType::Volume,
        ];
        ALL.into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseRequirementTypeError(s.to_string()))
    }
}

/// A requirement as declared on the job, before interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementTemplate {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: RequirementType,
    pub name: String,
    pub value: String,
}

impl RequirementTemplate {
    pub fn new(
        id: i64,
        kind: RequirementType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A resolved requirement. Name and value are plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: RequirementType,
    pub name: String,
    pub value: String,
}

impl Requirement {
    pub fn is_service(&self) -> bool {
        self.kind == RequirementType::Service
    }
}

pub type RequirementList = Vec<Requirement>;

/// Append a requirement to a list.
pub fn add_requirement(
    list: &mut RequirementList,
    id: i64,
    name: impl Into<String>,
    kind: RequirementType,
    value: impl Into<String>,
) {
    list.push(Requirement {
        id,
        kind,
        name: name.into(),
        value: value.into(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&RequirementType::OsArchitecture).unwrap(),
            "\"os-architecture\""
        );
        assert_eq!(
            "service".parse::<RequirementType>().unwrap(),
            RequirementType::Service
        );
        assert!("Service".parse::<RequirementType>().is_err());
    }

    #[test]
    fn test_template_uses_type_key() {
        let t = RequirementTemplate::new(1, RequirementType::Os, "os", "linux");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "os");
    }
}
