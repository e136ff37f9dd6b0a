//! Hatcheries: worker-provisioning agents that book jobs.
//!
//! The scheduler does not own hatchery registration or liveness. It only
//! needs enough of the profile to decide whether a hatchery can run a job,
//! and a reference to record in a booking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::HatcheryId;
use crate::requirement::Requirement;

/// Registration model of a hatchery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hatchery {
    pub id: HatcheryId,
    pub uid: String,
    pub name: String,
    pub model_type: String,
    pub is_shared_infra: bool,
    /// Share of spawned workers that may carry service sidecars, in percent.
    pub ratio_service: u32,
    /// Requirement names this hatchery's workers can satisfy.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl Hatchery {
    pub fn reference(&self) -> HatcheryRef {
        HatcheryRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Whether this hatchery can run a job with the given resolved requirements.
    ///
    /// Every non-service requirement name must be declared as a capability.
    /// Service requirements need a hatchery that provisions sidecars at all.
    pub fn satisfies(&self, requirements: &[Requirement]) -> bool {
        requirements.iter().all(|r| {
            if r.is_service() {
                self.ratio_service > 0
            } else {
                self.capabilities.contains(&r.name)
            }
        })
    }
}

/// The identity stored in a booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HatcheryRef {
    pub id: HatcheryId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::RequirementType;

    fn hatchery(capabilities: &[&str], ratio_service: u32) -> Hatchery {
        Hatchery {
            id: HatcheryId::new(1),
            uid: "uid-1".to_string(),
            name: "docker-1".to_string(),
            model_type: "docker".to_string(),
            is_shared_infra: true,
            ratio_service,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn req(kind: RequirementType, name: &str) -> Requirement {
        Requirement {
            id: 0,
            kind,
            name: name.to_string(),
            value: String::new(),
        }
    }

    #[test]
    fn test_satisfies_requires_every_capability() {
        let h = hatchery(&["git", "docker"], 0);
        assert!(h.satisfies(&[]));
        assert!(h.satisfies(&[req(RequirementType::Binary, "git")]));
        assert!(!h.satisfies(&[
            req(RequirementType::Binary, "git"),
            req(RequirementType::Binary, "npm"),
        ]));
    }

    #[test]
    fn test_service_requirement_needs_service_ratio() {
        let reqs = [req(RequirementType::Service, "pg")];
        assert!(!hatchery(&[], 0).satisfies(&reqs));
        assert!(hatchery(&[], 20).satisfies(&reqs));
    }
}
