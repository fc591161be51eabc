//! Column masking
//!
//! Classifies warehouse columns by name and provisions role- or user-scoped
//! masking policies for the sensitive ones.

pub mod catalog;
pub mod orchestrator;
pub mod provisioner;
pub mod rules;
pub mod scanner;
pub mod target;
pub mod templates;
pub mod types;

pub use orchestrator::{MaskingPreview, MaskingRun, Orchestrator};
pub use rules::{RuleSet, SensitivityType};
pub use target::{PolicyTarget, RoleTarget, TargetingStrategy};
pub use templates::PolicyTemplateRegistry;
