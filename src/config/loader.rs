use config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

use super::runtime::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Environment variable prefix, e.g. `LEAGUE_PIPELINE_MODEL_OPTIONS__TEST_SIZE=0.3`.
pub const ENV_PREFIX: &str = "LEAGUE_PIPELINE";

/// Load the pipeline configuration.
///
/// Layering order: built-in defaults, then the TOML file at `path` (optional),
/// then environment variables. The result is validated before it is returned.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if dotenvy::dotenv().is_ok() {
        debug!("Loaded environment from .env");
    }

    let settings = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("model_options.feature_columns")
                .with_list_parse_key("model_options.target_columns"),
        )
        .build()?;

    let config: PipelineConfig = settings.try_deserialize()?;
    config
        .validate()
        .map_err(|errors| PipelineError::Configuration(errors.join(", ")))?;

    info!(
        "Configuration loaded from {} ({} features, test_size={}, seed={})",
        path.display(),
        config.model_options.feature_columns.len(),
        config.model_options.test_size,
        config.model_options.random_state
    );
    Ok(config)
}

/// Render the default configuration as TOML for `init-config`.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&PipelineConfig::default())
        .map_err(|e| PipelineError::Configuration(format!("failed to render default config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.model_options.random_state, 42);
        assert_eq!(config.report.top_features, 5);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[model_options]\nrandom_state = 7\n\n[report]\ntop_features = 3").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model_options.random_state, 7);
        assert_eq!(config.report.top_features, 3);
        assert_eq!(config.model_options.test_size, 0.2);
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[model_options]\ntest_size = 1.5\n").unwrap();

        match load_config(&path) {
            Err(PipelineError::Configuration(msg)) => assert!(msg.contains("test_size")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config_toml_parses_back() {
        let text = default_config_toml().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
