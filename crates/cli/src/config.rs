use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use toolmux_core::{OrchestratorConfig, ProviderLaunchSpec, TimeoutConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Launch order is registration order, which decides name collisions
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderLaunchSpec>,
}

fn default_providers() -> Vec<ProviderLaunchSpec> {
    vec![
        ProviderLaunchSpec::new("postgres", "toolmux-postgres"),
        ProviderLaunchSpec::new("arxiv", "toolmux-arxiv"),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            providers: default_providers(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!(path = %config_path.display(), "Configuration file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.providers {
            if spec.id.trim().is_empty() {
                bail!("provider with command '{}' has an empty id", spec.command);
            }
            if spec.command.trim().is_empty() {
                bail!("provider '{}' has an empty command", spec.id);
            }
            if !seen.insert(spec.id.as_str()) {
                bail!("provider id '{}' is configured more than once", spec.id);
            }
        }
        Ok(())
    }
}
