use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings read from `MODGRAPH_*` environment variables. Command line flags take precedence.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ModgraphConfig {
    pub catalog_dir: Option<PathBuf>,
    pub bind: bool,
    pub trace: bool,
}

impl ModgraphConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self::from(raw_config))
    }
}

impl From<RawConfig> for ModgraphConfig {
    fn from(raw_config: RawConfig) -> Self {
        Self {
            catalog_dir: raw_config.catalog.dir,
            bind: raw_config.resolve.bind.unwrap_or(false),
            trace: raw_config.resolve.trace.unwrap_or(false),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    catalog: CatalogConfig,
    #[serde(default)]
    resolve: ResolveConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CatalogConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ResolveConfig {
    bind: Option<bool>,
    trace: Option<bool>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("MODGRAPH")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
