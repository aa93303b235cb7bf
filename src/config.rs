//! Bot configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Bot configuration, loaded from `opsbot.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Name the bot answers to when mentioned as `@name`
    pub bot_name: String,
    pub aws: AwsConfig,
    pub openstack: OpenStackConfig,
    /// Links shown by `project links list`
    pub team_links: Vec<TeamLink>,
    pub rota: RotaConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: "opsbot".to_string(),
            aws: AwsConfig::default(),
            openstack: OpenStackConfig::default(),
            team_links: Vec::new(),
            rota: RotaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    /// AMI used for `--os_name=linux`
    pub linux_ami: String,
    pub ssh_user: String,
    /// Instance types offered in help text
    pub instance_types: Vec<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            linux_ami: "ami-0402e56c0a7afb78f".to_string(),
            ssh_user: "ec2-user".to_string(),
            instance_types: [
                "t2.micro", "t2.small", "t2.medium", "t3.micro", "t3.small", "t3.medium",
                "m5.large", "m5.xlarge",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenStackConfig {
    /// Key into `networks` used for new servers
    pub default_network: String,
    pub ssh_user: String,
    /// OS name (lowercase) -> image id
    pub images: BTreeMap<String, String>,
    /// Network name -> network id
    pub networks: BTreeMap<String, String>,
    pub flavors: Vec<String>,
}

impl Default for OpenStackConfig {
    fn default() -> Self {
        Self {
            default_network: "provider_net_shared".to_string(),
            ssh_user: "fedora".to_string(),
            images: BTreeMap::new(),
            networks: BTreeMap::new(),
            flavors: Vec::new(),
        }
    }
}

impl OpenStackConfig {
    /// Image id for an OS name, matched case-insensitively
    pub fn image_for(&self, os_name: &str) -> Option<&str> {
        self.images
            .get(&os_name.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn default_network_id(&self) -> Option<&str> {
        self.networks.get(&self.default_network).map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamLink {
    pub title: String,
    pub url: String,
}

/// Rotation access lists, keyed by sheet name with Slack user ids as values
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RotaConfig {
    pub admins: BTreeMap<String, String>,
    pub users: BTreeMap<String, String>,
}

impl RotaConfig {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.values().any(|id| id == user_id)
    }

    pub fn is_user(&self, user_id: &str) -> bool {
        self.users.values().any(|id| id == user_id)
    }
}

impl BotConfig {
    /// Load config from a TOML file, falling back to defaults if absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        tracing::info!(
            "loaded config from {} ({} images, {} team links)",
            path.display(),
            config.openstack.images.len(),
            config.team_links.len()
        );

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Slack credentials, read from the environment
#[derive(Clone, Default)]
pub struct Secrets {
    pub slack_bot_token: Option<String>,
    pub slack_app_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            slack_bot_token: std::env::var("SLACK_BOT_TOKEN").ok(),
            slack_app_token: std::env::var("SLACK_APP_TOKEN").ok(),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Secrets")
            .field("slack_bot_token", &redact(&self.slack_bot_token))
            .field("slack_app_token", &redact(&self.slack_app_token))
            .finish()
    }
}
