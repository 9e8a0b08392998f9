//! CLI configuration management.
//!
//! Remembers the identity endpoint, tenant, catalog service name, region and
//! last username between runs so only the password has to be supplied.
//! Stored at `~/.config/swiftkit/config.json`.
//!
//! `resolve` builds the client `SwiftConfig` from, in order of precedence:
//! the `OS_*` environment (including a `.env` file), a JSON config named by
//! `SWIFTKIT_CONFIG`, and the remembered values. The password comes from
//! `OS_PASSWORD`, the keychain, or an interactive prompt.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use swiftkit_core::{Credentials, SwiftConfig};
use tracing::debug;

use crate::credentials::CredentialStore;

/// Application name used for the config directory
const APP_NAME: &str = "swiftkit";

const CONFIG_FILE: &str = "config.json";

/// Points at a full `SwiftConfig` JSON file
const CONFIG_PATH_ENV: &str = "SWIFTKIT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliConfig {
    pub auth_url: Option<String>,
    pub tenant_name: Option<String>,
    pub service_name: Option<String>,
    pub region: Option<String>,
    pub last_username: Option<String>,
}

impl CliConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Remember everything about `credentials` except the password
    pub fn remember(&mut self, credentials: &Credentials) {
        self.auth_url = Some(credentials.auth_url.clone());
        self.tenant_name = Some(credentials.tenant_name.clone()).filter(|t| !t.is_empty());
        self.service_name = Some(credentials.service_name.clone());
        self.region = credentials.region.clone();
        self.last_username = Some(credentials.username.clone());
    }

    /// The remembered value standing in for an `OS_*` variable
    fn remembered(&self, key: &str) -> Option<String> {
        match key {
            "OS_AUTH_URL" => self.auth_url.clone(),
            "OS_USERNAME" => self.last_username.clone(),
            "OS_TENANT_NAME" => self.tenant_name.clone(),
            "OS_SERVICE_NAME" => self.service_name.clone(),
            "OS_REGION_NAME" => self.region.clone(),
            _ => None,
        }
    }

    /// Look `key` up in `env` first, then in the remembered values
    pub fn layered<'a, F>(&'a self, env: F) -> impl Fn(&str) -> Option<String> + 'a
    where
        F: Fn(&str) -> Option<String> + 'a,
    {
        move |key: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| self.remembered(key))
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Build the client config for this run
pub fn resolve(cli: &CliConfig) -> Result<SwiftConfig> {
    if let Some(path) = env_var(CONFIG_PATH_ENV) {
        return from_config_file(Path::new(&path));
    }

    let lookup = cli.layered(env_var);
    let username = lookup("OS_USERNAME")
        .context("No username: set OS_USERNAME or run `swiftkit login --save` once")?;
    let password = match lookup("OS_PASSWORD") {
        Some(password) => password,
        None => password_for(&username)?,
    };

    SwiftConfig::from_lookup(|key| {
        if key == "OS_PASSWORD" {
            Some(password.clone())
        } else {
            lookup(key)
        }
    })
    .context("Invalid configuration")
}

fn from_config_file(path: &Path) -> Result<SwiftConfig> {
    let mut config = SwiftConfig::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    if config.credentials.password.is_empty() {
        config.credentials.password = match env_var("OS_PASSWORD").filter(|p| !p.is_empty()) {
            Some(password) => password,
            None => password_for(&config.credentials.username)?,
        };
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Keychain first, then ask
fn password_for(username: &str) -> Result<String> {
    match CredentialStore::get_password(username) {
        Ok(password) => Ok(password),
        Err(e) => {
            debug!(error = %e, "No keychain password");
            prompt_password(username)
        }
    }
}

pub fn prompt_password(username: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    Ok(password)
}
