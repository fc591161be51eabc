//! Masking template registry
//!
//! Maps (role, sensitivity type) to a SQL expression with a `{column}`
//! placeholder. Substitution is plain text replacement with the column name;
//! identifiers are not quoted or escaped here, so callers must only pass
//! names that are safe SQL identifiers.

use crate::error::AppError;
use crate::masking::rules::SensitivityType;
use serde::Serialize;
use std::collections::HashMap;

pub const COLUMN_PLACEHOLDER: &str = "{column}";

/// Template key used for user-based targets
pub const DEFAULT_TEMPLATE_ROLE: &str = "default";

const FULL_MASK: &str = "'***MASKED***'::text";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskingTemplate {
    pub role: String,
    pub sensitivity: SensitivityType,
    pub expression: String,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyTemplateRegistry {
    templates: HashMap<(String, SensitivityType), String>,
}

impl PolicyTemplateRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// public (constant masks), analyst_role (partial masks), admin_role
    /// (raw column) and default (constant masks, for user targets)
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        for role in ["public", DEFAULT_TEMPLATE_ROLE] {
            registry.register(role, SensitivityType::Email, FULL_MASK);
            registry.register(role, SensitivityType::Phone, FULL_MASK);
            registry.register(role, SensitivityType::Ssn, "'XXX-XX-XXXX'::text");
            registry.register(role, SensitivityType::CreditCard, "'****-****-****-****'::text");
            registry.register(role, SensitivityType::Name, FULL_MASK);
            registry.register(role, SensitivityType::Address, FULL_MASK);
        }

        registry.register(
            "analyst_role",
            SensitivityType::Email,
            "REGEXP_REPLACE({column}, '@.*', '@*****.com')",
        );
        registry.register(
            "analyst_role",
            SensitivityType::Phone,
            "CONCAT(LEFT({column}, 3), '-***-****')",
        );
        registry.register("analyst_role", SensitivityType::Ssn, "REDACT_SSN({column})");
        registry.register(
            "analyst_role",
            SensitivityType::CreditCard,
            "CONCAT('****-****-****-', RIGHT({column}, 4))",
        );
        registry.register(
            "analyst_role",
            SensitivityType::Name,
            "CONCAT(LEFT({column}, 1), REPEAT('*', LENGTH({column})-1))",
        );
        registry.register(
            "analyst_role",
            SensitivityType::Address,
            "CONCAT(LEFT({column}, 10), '***')",
        );

        for sensitivity in SensitivityType::ALL {
            registry.register("admin_role", sensitivity, COLUMN_PLACEHOLDER);
        }

        registry
    }

    /// Add or replace a template
    pub fn register(&mut self, role: &str, sensitivity: SensitivityType, expression: &str) {
        self.templates
            .insert((role.to_string(), sensitivity), expression.to_string());
    }

    /// Look up the raw template for a (role, type) pair
    pub fn resolve(&self, role: &str, sensitivity: SensitivityType) -> Result<&str, AppError> {
        self.templates
            .get(&(role.to_string(), sensitivity))
            .map(String::as_str)
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "No masking template for role '{}' and type '{}'",
                    role, sensitivity
                ))
            })
    }

    /// Resolve and substitute the column name
    pub fn render(
        &self,
        role: &str,
        sensitivity: SensitivityType,
        column: &str,
    ) -> Result<String, AppError> {
        self.resolve(role, sensitivity)
            .map(|template| substitute(template, column))
    }

    /// All templates, sorted by role then type
    pub fn templates(&self) -> Vec<MaskingTemplate> {
        let mut templates: Vec<MaskingTemplate> = self
            .templates
            .iter()
            .map(|((role, sensitivity), expression)| MaskingTemplate {
                role: role.clone(),
                sensitivity: *sensitivity,
                expression: expression.clone(),
            })
            .collect();
        templates.sort_by(|a, b| (&a.role, a.sensitivity).cmp(&(&b.role, b.sensitivity)));
        templates
    }
}

pub fn substitute(template: &str, column: &str) -> String {
    template.replace(COLUMN_PLACEHOLDER, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_role_covers_every_type() {
        let registry = PolicyTemplateRegistry::builtin();
        for role in ["public", "analyst_role", "admin_role", DEFAULT_TEMPLATE_ROLE] {
            for sensitivity in SensitivityType::ALL {
                assert!(
                    registry.resolve(role, sensitivity).is_ok(),
                    "missing template for {}/{}",
                    role,
                    sensitivity
                );
            }
        }
    }

    #[test]
    fn test_admin_sees_raw_column() {
        let registry = PolicyTemplateRegistry::builtin();
        assert_eq!(registry.render("admin_role", SensitivityType::Ssn, "SSN").unwrap(), "SSN");
    }

    #[test]
    fn test_analyst_partial_masks() {
        let registry = PolicyTemplateRegistry::builtin();
        assert_eq!(
            registry.render("analyst_role", SensitivityType::Email, "e_mail").unwrap(),
            "REGEXP_REPLACE(e_mail, '@.*', '@*****.com')"
        );
        assert_eq!(
            registry.render("analyst_role", SensitivityType::Name, "full_name").unwrap(),
            "CONCAT(LEFT(full_name, 1), REPEAT('*', LENGTH(full_name)-1))"
        );
    }

    #[test]
    fn test_public_masks_are_constant() {
        let registry = PolicyTemplateRegistry::builtin();
        assert_eq!(
            registry.render("public", SensitivityType::Ssn, "SSN").unwrap(),
            "'XXX-XX-XXXX'::text"
        );
    }

    #[test]
    fn test_missing_pair_is_configuration_error() {
        let registry = PolicyTemplateRegistry::builtin();
        let err = registry.resolve("auditor_role", SensitivityType::Email).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));

        let empty = PolicyTemplateRegistry::new();
        assert!(empty.resolve("public", SensitivityType::Email).is_err());
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = PolicyTemplateRegistry::builtin();
        registry.register("auditor_role", SensitivityType::Phone, "RIGHT({column}, 4)");
        assert_eq!(
            registry.render("auditor_role", SensitivityType::Phone, "mobile").unwrap(),
            "RIGHT(mobile, 4)"
        );
        assert_eq!(registry.templates().len(), 6 * 4 + 1);
    }
}
