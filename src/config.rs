use std::path::PathBuf;

use anyhow::bail;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::flow::{ApplicationId, PRIORITY_GATEWAY_RULE, ROUTING_TABLE};
use crate::handler::RuleSettings;
use crate::leadership::NodeId;

pub const DEFAULT_APP_NAME: &str = "gwsync";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Application name: leadership topic and flow rule owner.
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_node_id: Option<String>,
    pub gateway_priority: u32,
    pub routing_table: u32,
    /// JSON inventory snapshot loaded at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_file: Option<PathBuf>,
    /// Read newline-delimited inventory updates from stdin.
    pub read_stdin_feed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.into(),
            local_node_id: None,
            gateway_priority: PRIORITY_GATEWAY_RULE,
            routing_table: ROUTING_TABLE,
            inventory_file: None,
            read_stdin_feed: true,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("gwsync.toml"))
            .merge(Json::file("gwsync.json"))
            .merge(Env::prefixed("GWSYNC_"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.app_name.trim().is_empty() {
            bail!("app_name must not be empty");
        }
        Ok(config)
    }

    /// Cluster identity of this process: the configured id, else the
    /// `HOSTNAME` environment variable, else `localhost`.
    pub fn local_node(&self) -> NodeId {
        let id = self
            .local_node_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| "localhost".to_string());
        NodeId::new(id)
    }

    pub fn rule_settings(&self) -> RuleSettings {
        RuleSettings {
            app_id: ApplicationId::new(self.app_name.clone()),
            priority: self.gateway_priority,
            table: self.routing_table,
        }
    }
}
