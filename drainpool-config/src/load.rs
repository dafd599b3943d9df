use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding configuration files.
const CONFIGURATION_DIR: &str = "configuration";

/// File extensions probed, in order, for every configuration layer.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix of environment variables that override file values.
const ENV_PREFIX: &str = "APP";

/// Separator between [`ENV_PREFIX`] and the first key segment.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator between nested key segments (`APP_EXECUTOR__WORKER_COUNT`).
const ENV_SEPARATOR: &str = "__";

/// Separator for list values passed through environment variables.
const LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structures loadable through [`load_config`].
pub trait Config {
    /// Keys whose environment values are split on commas into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// A layer of the configuration hierarchy backed by a file.
#[derive(Debug, Clone, Copy)]
enum Layer {
    /// Values shared by every environment.
    Base,
    /// Overrides for one runtime environment.
    Environment(Environment),
}

impl Layer {
    fn file_stem(&self) -> &'static str {
        match self {
            Layer::Base => "base",
            Layer::Environment(environment) => environment.as_str(),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Base => f.write_str("base configuration"),
            Layer::Environment(environment) => write!(f, "{environment} environment configuration"),
        }
    }
}

/// Errors produced while assembling a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {layer} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        layer: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {layer} from `{path}`: {source}")]
    ConfigurationFileLoad {
        layer: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads `T` from `./configuration`, the environment selected by `APP_ENVIRONMENT`,
/// and `APP_`-prefixed environment variables, in increasing order of precedence.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads `T` from an explicit configuration directory and environment.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let base_file = locate_layer(directory, Layer::Base)?;
    let environment_file = locate_layer(directory, Layer::Environment(environment))?;

    let builder = config::Config::builder().add_source(config::File::from(base_file.clone()));
    check_layer(&builder, Layer::Base, &base_file)?;

    let builder = builder.add_source(config::File::from(environment_file.clone()));
    check_layer(&builder, Layer::Environment(environment), &environment_file)?;

    let settings = builder
        .add_source(environment_overrides::<T>())
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Builds the environment-variable source, enabling list parsing for the keys `T` declares.
fn environment_overrides<T: Config>() -> config::Environment {
    let source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    if T::LIST_PARSE_KEYS.is_empty() {
        return source;
    }

    T::LIST_PARSE_KEYS
        .iter()
        .fold(source.list_separator(LIST_SEPARATOR), |source, key| {
            source.with_list_parse_key(key)
        })
}

/// Returns the first existing file for `layer` among the supported extensions.
fn locate_layer(directory: &Path, layer: Layer) -> Result<PathBuf, LoadConfigError> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{}.{extension}", layer.file_stem())))
        .collect();

    if let Some(found) = candidates.iter().find(|path| path.is_file()) {
        return Ok(found.clone());
    }

    let attempted = candidates
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        layer: layer.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the configuration accumulated so far to attribute parse errors to the right file.
fn check_layer(
    builder: &ConfigBuilder<DefaultState>,
    layer: Layer,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            layer: layer.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;
    use crate::shared::{CancelMode, ExecutorConfig};

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        executor: ExecutorConfig,
    }

    impl Config for TestConfig {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "drainpool-config-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = scratch_dir("override");
        fs::write(
            dir.join("base.yaml"),
            "executor:\n  worker_count: 2\n  queue_capacity: 16\n",
        )
        .unwrap();
        fs::write(
            dir.join("prod.yaml"),
            "executor:\n  worker_count: 8\n  cancel_mode: hard\n",
        )
        .unwrap();

        let config: TestConfig = load_config_from(&dir, Environment::Prod).unwrap();

        assert_eq!(config.executor.worker_count, 8);
        assert_eq!(config.executor.queue_capacity, 16);
        assert_eq!(config.executor.cancel_mode, CancelMode::Hard);
        assert_eq!(
            config.executor.drain_timeout_ms,
            ExecutorConfig::DEFAULT_DRAIN_TIMEOUT_MS
        );

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn json_files_are_accepted() {
        let dir = scratch_dir("json");
        fs::write(dir.join("base.json"), r#"{"executor": {"worker_count": 3}}"#).unwrap();
        fs::write(dir.join("dev.json"), "{}").unwrap();

        let config: TestConfig = load_config_from(&dir, Environment::Dev).unwrap();
        assert_eq!(config.executor.worker_count, 3);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_environment_file_is_reported() {
        let dir = scratch_dir("missing");
        fs::write(dir.join("base.yaml"), "executor: {}\n").unwrap();

        let err = load_config_from::<TestConfig>(&dir, Environment::Prod).unwrap_err();
        assert!(matches!(err, LoadConfigError::ConfigurationFileMissing { .. }));
        assert!(err.to_string().contains("prod.yaml"));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = std::env::temp_dir().join("drainpool-config-does-not-exist");
        let err = load_config_from::<TestConfig>(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(
            err,
            LoadConfigError::MissingConfigurationDirectory(_)
        ));
    }
}
