use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_database() -> String {
    "PIZZERIA_DEMO".to_string()
}

fn default_schema() -> String {
    "BELLA_NAPOLI".to_string()
}

fn default_warehouse() -> String {
    "DEMO_WH".to_string()
}

fn default_token_env() -> String {
    "SNOWFLAKE_TOKEN".to_string()
}

/// Connection profile for the warehouse SQL REST API.
///
/// The bearer token is never stored in the profile file; only the name of the
/// environment variable holding it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub account_url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_warehouse")]
    pub warehouse: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Profile {
    pub fn load(path: &Path, account_url_override: Option<String>) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        let mut profile: Profile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse profile {}", path.display()))?;
        if let Some(url) = account_url_override {
            profile.account_url = url;
        }
        profile.account_url = profile.account_url.trim_end_matches('/').to_string();
        Ok(profile)
    }

    /// Builds a profile from the account URL alone, using the demo defaults
    /// for everything else.
    pub fn from_account_url(account_url: String) -> Self {
        Self {
            account_url: account_url.trim_end_matches('/').to_string(),
            database: default_database(),
            schema: default_schema(),
            warehouse: default_warehouse(),
            token_env: default_token_env(),
        }
    }

    /// `DB.SCHEMA` prefix embedded into every query template.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }

    pub fn token(&self) -> Result<String> {
        std::env::var(&self.token_env).with_context(|| {
            format!(
                "Warehouse token not found: set the {} environment variable",
                self.token_env
            )
        })
    }
}
