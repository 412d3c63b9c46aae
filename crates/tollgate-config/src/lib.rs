//! Configuration management for Tollgate
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (TOLLGATE_* prefix, highest precedence)
//! 2. tollgate.local.toml (gitignored, local overrides)
//! 3. tollgate.toml (git-tracked, deployment config)
//! 4. ~/.config/tollgate/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Verification codes live at most a day.
const MAX_CODE_TTL_SECS: u64 = 86_400;

/// Main Tollgate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TollgateConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub verification: VerificationConfig,
    pub approval: ApprovalConfig,
    pub usernames: UsernameConfig,
    pub activation: ActivationConfig,
    pub store: StoreConfig,
    /// Member clusters signups can be placed on. The first entry is the
    /// default placement.
    pub clusters: Vec<MemberCluster>,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            verification: VerificationConfig::default(),
            approval: ApprovalConfig::default(),
            usernames: UsernameConfig::default(),
            activation: ActivationConfig::default(),
            store: StoreConfig::default(),
            clusters: vec![MemberCluster {
                name: "member-1".to_string(),
                console_url: "https://console.member-1.example.com/".to_string(),
                api_endpoint: "https://api.member-1.example.com:6443".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Reported to provisioned users as their proxy endpoint.
    pub proxy_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 bearer tokens.
    pub secret: String,
    pub issuer: String,
    pub audience: Option<String>,
    /// Lifetime of tokens minted by `tollgate token`.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: "tollgate-dev-secret-change-me".to_string(),
            issuer: "tollgate".to_string(),
            audience: None,
            token_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    /// Email domains whose users skip verification.
    pub excluded_email_domains: Vec<String>,
    pub code_length: u32,
    pub code_ttl_secs: u64,
    pub max_attempts: u32,
    pub daily_limit: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_email_domains: Vec::new(),
            code_length: 6,
            code_ttl_secs: 300,
            max_attempts: 3,
            daily_limit: 5,
        }
    }
}

impl VerificationConfig {
    /// Returns true if users with this email domain must verify.
    pub fn required_for_domain(&self, domain: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }
        match domain {
            Some(domain) => !self
                .excluded_email_domains
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(domain)),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub automatic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsernameConfig {
    pub forbidden_prefixes: Vec<String>,
    pub forbidden_suffixes: Vec<String>,
}

impl Default for UsernameConfig {
    fn default() -> Self {
        Self {
            forbidden_prefixes: ["openshift", "kube", "default", "redhat", "sandbox"]
                .map(String::from)
                .to_vec(),
            forbidden_suffixes: vec!["admin".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Conditional increments attempted per redemption before giving up.
    pub max_redeem_attempts: u32,
    /// Capacity used when an event is created without one.
    pub default_capacity: u32,
    /// Length of generated event codes.
    pub code_length: u32,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_redeem_attempts: 64,
            default_capacity: 100,
            code_length: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Attempts per read-modify-write before failing with a transient
    /// conflict.
    pub max_conflict_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 4,
        }
    }
}

/// A cluster users are provisioned onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCluster {
    pub name: String,
    pub console_url: String,
    pub api_endpoint: String,
}

impl TollgateConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific deployment directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Create a development configuration: no verification, automatic
    /// approval.
    pub fn development() -> Self {
        Self {
            verification: VerificationConfig {
                enabled: false,
                ..Default::default()
            },
            approval: ApprovalConfig { automatic: true },
            ..Default::default()
        }
    }

    /// Parses a single TOML document on top of the built-in defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::RenderError)
    }

    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.auth.secret.is_empty() {
            return invalid("auth.secret must not be empty");
        }
        if !(4..=10).contains(&self.verification.code_length) {
            return invalid("verification.code_length must be between 4 and 10");
        }
        if !(1..=MAX_CODE_TTL_SECS).contains(&self.verification.code_ttl_secs) {
            return invalid("verification.code_ttl_secs must be between 1 and 86400");
        }
        if self.verification.max_attempts == 0 {
            return invalid("verification.max_attempts must be positive");
        }
        if self.verification.daily_limit == 0 {
            return invalid("verification.daily_limit must be positive");
        }
        if !(1..=8).contains(&self.store.max_conflict_retries) {
            return invalid("store.max_conflict_retries must be between 1 and 8");
        }
        if self.activation.max_redeem_attempts == 0 {
            return invalid("activation.max_redeem_attempts must be positive");
        }
        if self.activation.code_length == 0 {
            return invalid("activation.code_length must be positive");
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                return invalid("cluster names must not be empty");
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate cluster name {}",
                    cluster.name
                )));
            }
        }
        Ok(())
    }
}
