// Runtime settings shared by the connection layer and the orchestrator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How to start one tool provider process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLaunchSpec {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ProviderLaunchSpec {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

/// Bounds on every suspension point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_handshake_secs")]
    pub handshake_secs: u64,

    #[serde(default = "default_call_secs")]
    pub call_secs: u64,

    #[serde(default = "default_model_secs")]
    pub model_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_handshake_secs() -> u64 {
    15
}

fn default_call_secs() -> u64 {
    60
}

fn default_model_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    3
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: default_handshake_secs(),
            call_secs: default_call_secs(),
            model_secs: default_model_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }

    pub fn model(&self) -> Duration {
        Duration::from_secs(self.model_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on model→tools→model rounds within one user turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Re-establish closed provider sessions before the next dispatch
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

fn default_max_tool_rounds() -> usize {
    8
}

fn default_reconnect() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            reconnect: default_reconnect(),
        }
    }
}
