use drainpool_config::shared::{ExecutorConfig, ReporterConfig, ValidationError};
use drainpool_config::{Config, LoadConfigError, load_config};
use serde::Deserialize;
use tracing::info;

/// Configuration shared by every demo scenario.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DemoConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub reporter: ReporterConfig,
}

impl DemoConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.executor.validate()?;
        self.reporter.validate()
    }
}

impl Config for DemoConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Loads the demo configuration, falling back to defaults when no configuration directory
/// exists in the working directory.
pub fn load_demo_config() -> anyhow::Result<DemoConfig> {
    let config = match load_config::<DemoConfig>() {
        Ok(config) => config,
        Err(LoadConfigError::MissingConfigurationDirectory(directory)) => {
            info!(
                directory = %directory.display(),
                "no configuration directory, using defaults"
            );
            DemoConfig::default()
        }
        Err(err) => return Err(err.into()),
    };
    config.validate()?;

    Ok(config)
}
