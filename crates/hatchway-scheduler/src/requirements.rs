//! Requirement resolution and projection.
//!
//! Templates are interpolated against the node run's build parameters. The
//! resolved list is then projected into `job.requirement.*` parameters that
//! the executing worker reads.

use std::fmt;

use hatchway_config::{InterpolationError, ParameterContext};
use hatchway_core::parameter::{Parameter, add_parameter};
use hatchway_core::requirement::{
    Requirement, RequirementList, RequirementTemplate, RequirementType, add_requirement,
};
use thiserror::Error;

/// Which half of a template failed to interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    Name,
    Value,
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateField::Name => f.write_str("name"),
            TemplateField::Value => f.write_str("value"),
        }
    }
}

/// One template that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("requirement {template_id} {field}: {source}")]
pub struct RequirementError {
    pub template_id: i64,
    pub field: TemplateField,
    pub source: InterpolationError,
}

/// Every template failure of one resolution pass, in template order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} requirement(s) could not be resolved: {}", .0.len(), join_errors(.0))]
pub struct ResolutionErrors(pub Vec<RequirementError>);

fn join_errors(errors: &[RequirementError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ResolutionErrors {
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

/// Outcome of resolving a job's templates.
///
/// `requirements` holds whatever resolved, even when `errors` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub requirements: RequirementList,
    pub contains_service: bool,
    pub errors: Option<ResolutionErrors>,
}

/// Interpolate every template against the build parameters.
pub fn resolve_requirements(
    templates: &[RequirementTemplate],
    build_parameters: &[Parameter],
) -> Resolution {
    let ctx = ParameterContext::from_parameters(build_parameters);
    let mut requirements = RequirementList::new();
    let mut errors = Vec::new();

    for template in templates {
        let name = match ctx.interpolate(&template.name) {
            Ok(name) => name,
            Err(source) => {
                errors.push(RequirementError {
                    template_id: template.id,
                    field: TemplateField::Name,
                    source,
                });
                continue;
            }
        };
        let value = match ctx.interpolate(&template.value) {
            Ok(value) => value,
            Err(source) => {
                errors.push(RequirementError {
                    template_id: template.id,
                    field: TemplateField::Value,
                    source,
                });
                continue;
            }
        };
        add_requirement(&mut requirements, template.id, name, template.kind, value);
    }

    let contains_service = requirements.iter().any(Requirement::is_service);
    Resolution {
        requirements,
        contains_service,
        errors: (!errors.is_empty()).then_some(ResolutionErrors(errors)),
    }
}

/// Project resolved requirements into worker parameters.
pub fn project_requirements(requirements: &[Requirement]) -> Vec<Parameter> {
    let mut params = Vec::new();

    for requirement in requirements {
        let key = format!(
            "job.requirement.{}.{}",
            requirement.kind.as_str().to_lowercase(),
            requirement.name.to_lowercase()
        );

        if requirement.kind == RequirementType::Service {
            let tokens: Vec<&str> = requirement.value.split(' ').collect();
            if let [image, options @ ..] = tokens.as_slice() {
                if !options.is_empty() {
                    add_parameter(&mut params, format!("{key}.image"), *image);
                    add_parameter(&mut params, format!("{key}.options"), options.join(" "));
                }
            }
        }

        add_parameter(&mut params, key, requirement.value.clone());
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::new("cds.project", "P"),
            Parameter::new("cds.workflow", "W"),
        ]
    }

    #[test]
    fn test_resolves_name_and_value() {
        let templates = vec![RequirementTemplate::new(
            1,
            RequirementType::Os,
            "os-${cds.project}",
            "linux-${cds.workflow}",
        )];

        let resolution = resolve_requirements(&templates, &params());
        assert!(resolution.errors.is_none());
        assert!(!resolution.contains_service);
        assert_eq!(resolution.requirements.len(), 1);
        assert_eq!(resolution.requirements[0].name, "os-P");
        assert_eq!(resolution.requirements[0].value, "linux-W");
        assert_eq!(resolution.requirements[0].kind, RequirementType::Os);
    }

    #[test]
    fn test_no_templates() {
        let resolution = resolve_requirements(&[], &params());
        assert!(resolution.requirements.is_empty());
        assert!(!resolution.contains_service);
        assert!(resolution.errors.is_none());
    }

    #[test]
    fn test_service_projection_splits_image_and_options() {
        let templates = vec![RequirementTemplate::new(
            1,
            RequirementType::Service,
            "pg",
            "postgres:9.6 --flag",
        )];

        let resolution = resolve_requirements(&templates, &[]);
        assert!(resolution.contains_service);

        let projected = project_requirements(&resolution.requirements);
        assert_eq!(
            projected,
            vec![
                Parameter::new("job.requirement.service.pg.image", "postgres:9.6"),
                Parameter::new("job.requirement.service.pg.options", "--flag"),
                Parameter::new("job.requirement.service.pg", "postgres:9.6 --flag"),
            ]
        );
    }

    #[test]
    fn test_single_token_service_has_no_derived_keys() {
        let requirements = vec![Requirement {
            id: 1,
            kind: RequirementType::Service,
            name: "Redis".to_string(),
            value: "redis:7".to_string(),
        }];

        let projected = project_requirements(&requirements);
        assert_eq!(
            projected,
            vec![Parameter::new("job.requirement.service.redis", "redis:7")]
        );
    }

    #[test]
    fn test_options_keep_every_remaining_token() {
        let requirements = vec![Requirement {
            id: 1,
            kind: RequirementType::Service,
            name: "pg".to_string(),
            value: "postgres:14 -e A=1 -e B=2".to_string(),
        }];

        let projected = project_requirements(&requirements);
        assert_eq!(projected[1].value, "-e A=1 -e B=2");
    }

    #[test]
    fn test_projection_lowercases_type_and_name() {
        let requirements = vec![
            Requirement {
                id: 1,
                kind: RequirementType::OsArchitecture,
                name: "Linux/AMD64".to_string(),
                value: "linux/amd64".to_string(),
            },
            Requirement {
                id: 2,
                kind: RequirementType::Binary,
                name: "Git".to_string(),
                value: "Git".to_string(),
            },
        ];

        let projected = project_requirements(&requirements);
        assert_eq!(
            projected,
            vec![
                Parameter::new("job.requirement.os-architecture.linux/amd64", "linux/amd64"),
                Parameter::new("job.requirement.binary.git", "Git"),
            ]
        );
    }

    #[test]
    fn test_errors_accumulate_one_per_template() {
        let templates = vec![
            // Both halves fail; only the name is reported
            RequirementTemplate::new(1, RequirementType::Binary, "${missing.a}", "${missing.b}"),
            RequirementTemplate::new(2, RequirementType::Binary, "git", "git"),
            RequirementTemplate::new(3, RequirementType::Service, "pg", "postgres:${missing.c"),
            RequirementTemplate::new(4, RequirementType::Model, "m", "${cds.project}"),
        ];

        let resolution = resolve_requirements(&templates, &params());

        let names: Vec<_> = resolution
            .requirements
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["git", "m"]);
        // The failed service template does not count
        assert!(!resolution.contains_service);

        let errors = resolution.errors.unwrap().0;
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].template_id, 1);
        assert_eq!(errors[0].field, TemplateField::Name);
        assert!(matches!(
            &errors[0].source,
            InterpolationError::Unresolved { name, .. } if name == "missing.a"
        ));
        assert_eq!(errors[1].template_id, 3);
        assert_eq!(errors[1].field, TemplateField::Value);
        assert!(matches!(
            errors[1].source,
            InterpolationError::Malformed { .. }
        ));
    }

    #[test]
    fn test_error_messages() {
        let templates = vec![RequirementTemplate::new(
            7,
            RequirementType::Binary,
            "${nope}",
            "x",
        )];
        let errors = resolve_requirements(&templates, &[]).errors.unwrap();
        assert_eq!(
            errors.messages(),
            vec![r#"requirement 7 name: unresolved variable ${nope} in "${nope}""#.to_string()]
        );
    }
}
