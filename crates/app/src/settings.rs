//! Settings of the application, read from an optional `settings.toml` and
//! `FINLEDGER__*` environment variables (`FINLEDGER__APP__LEVEL=debug`).
//!
//! See `settings.toml` at the repository root for an example.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("finledger.db".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Currencies {
    /// Empty means the engine default set.
    #[serde(default)]
    pub allowed: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub currencies: Currencies,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("FINLEDGER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("currencies.allowed")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
