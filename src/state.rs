//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::cluster::ClusterRegistry;
use crate::config::MaskingConfig;
use crate::masking::{Orchestrator, PolicyTemplateRegistry, RuleSet};
use crate::statement::{PostgresStatementApi, StatementApi};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Registered warehouse clusters and their pools
    pub clusters: Arc<ClusterRegistry>,

    /// Drives scans and masking runs
    pub orchestrator: Orchestrator,

    /// Ordered sensitivity rules
    pub rules: Arc<RuleSet>,

    /// Masking expression templates
    pub templates: Arc<PolicyTemplateRegistry>,

    pub masking: MaskingConfig,
}

impl AppState {
    /// State backed by the connection-pool execution service
    pub fn new(masking: MaskingConfig) -> Self {
        let clusters = Arc::new(ClusterRegistry::new());
        let api: Arc<dyn StatementApi> = Arc::new(PostgresStatementApi::new(clusters.clone()));
        Self::with_api(clusters, api, masking)
    }

    /// State over any execution service
    pub fn with_api(
        clusters: Arc<ClusterRegistry>,
        api: Arc<dyn StatementApi>,
        masking: MaskingConfig,
    ) -> Self {
        let rules = Arc::new(RuleSet::builtin());
        let templates = Arc::new(PolicyTemplateRegistry::builtin());
        let orchestrator = Orchestrator::new(api, templates.clone(), rules.clone(), &masking);

        Self {
            clusters,
            orchestrator,
            rules,
            templates,
            masking,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
