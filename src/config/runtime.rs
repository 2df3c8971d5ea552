use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataSettings,
    pub model_options: ModelOptions,
    pub report: ReportSettings,
    pub store: StoreSettings,
    pub scheduler: SchedulerSettings,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let options = &self.model_options;

        // Split validation
        if !(options.test_size > 0.0 && options.test_size < 1.0) {
            errors.push(format!("test_size must be in (0, 1), got {}", options.test_size));
        }

        // Column validation
        if options.feature_columns.is_empty() {
            errors.push("feature_columns must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for column in &options.feature_columns {
            if !seen.insert(column.as_str()) {
                errors.push(format!("feature column '{}' is listed twice", column));
            }
        }
        if options.target_columns.len() != 2 {
            errors.push(format!(
                "target_columns must name exactly the duration and outcome targets, got {}",
                options.target_columns.len()
            ));
        }
        for target in &options.target_columns {
            if options.feature_columns.contains(target) {
                errors.push(format!("target '{}' is also listed as a feature", target));
            }
        }

        // Regression roster
        let reg = &options.regression_models;
        if reg.ridge_alpha < 0.0 {
            errors.push("regression_models.ridge_alpha must be >= 0".to_string());
        }
        if reg.lasso_alpha <= 0.0 {
            errors.push("regression_models.lasso_alpha must be > 0".to_string());
        }
        if reg.lasso_max_iter == 0 {
            errors.push("regression_models.lasso_max_iter must be > 0".to_string());
        }
        if reg.rf_n_estimators == 0 || reg.gb_n_estimators == 0 {
            errors.push("regression_models: estimator counts must be > 0".to_string());
        }
        if reg.rf_max_depth == 0 || reg.gb_max_depth == 0 {
            errors.push("regression_models: tree depths must be > 0".to_string());
        }
        if reg.gb_learning_rate <= 0.0 {
            errors.push("regression_models.gb_learning_rate must be > 0".to_string());
        }

        // Classification roster
        let cls = &options.classification_models;
        if cls.lr_max_iter == 0 {
            errors.push("classification_models.lr_max_iter must be > 0".to_string());
        }
        if cls.lr_c <= 0.0 || cls.svm_c <= 0.0 {
            errors.push("classification_models: regularisation C must be > 0".to_string());
        }
        if cls.rf_n_estimators == 0 || cls.gb_n_estimators == 0 {
            errors.push("classification_models: estimator counts must be > 0".to_string());
        }
        if cls.rf_max_depth == 0 || cls.gb_max_depth == 0 {
            errors.push("classification_models: tree depths must be > 0".to_string());
        }
        if cls.gb_learning_rate <= 0.0 {
            errors.push("classification_models.gb_learning_rate must be > 0".to_string());
        }
        if cls.svm_max_iter == 0 {
            errors.push("classification_models.svm_max_iter must be > 0".to_string());
        }
        if cls.svm_cache_mb == 0 {
            errors.push("classification_models.svm_cache_mb must be > 0".to_string());
        }

        if self.report.top_features == 0 {
            errors.push("report.top_features must be >= 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Locations and column names of the cleaned raw exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub matchinfo_path: PathBuf,
    pub kills_path: PathBuf,
    pub monsters_path: PathBuf,
    pub structures_path: PathBuf,
    pub gold_path: PathBuf,
    /// Join key present in every table
    pub key_column: String,
    /// Team-side tag of event rows (e.g. `bKills`)
    pub team_column: String,
    /// Event kind column (gold rows use `golddiff`)
    pub type_column: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            matchinfo_path: PathBuf::from("data/02_intermediate/matchinfo_clean.csv"),
            kills_path: PathBuf::from("data/02_intermediate/kills_clean.csv"),
            monsters_path: PathBuf::from("data/02_intermediate/monsters_clean.csv"),
            structures_path: PathBuf::from("data/02_intermediate/structures_clean.csv"),
            gold_path: PathBuf::from("data/02_intermediate/gold_clean.csv"),
            key_column: "Address".to_string(),
            team_column: "Team".to_string(),
            type_column: "Type".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub feature_columns: Vec<String>,
    /// `[duration, outcome]`
    pub target_columns: Vec<String>,
    pub test_size: f64,
    pub random_state: u64,
    pub scaling: ScalingSettings,
    pub regression_models: RegressionParams,
    pub classification_models: ClassificationParams,
}

impl ModelOptions {
    pub fn regression_target(&self) -> &str {
        self.target_columns.first().map(String::as_str).unwrap_or("gamelength")
    }

    pub fn classification_target(&self) -> &str {
        self.target_columns.get(1).map(String::as_str).unwrap_or("bResult")
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            feature_columns: [
                "kill_diff",
                "dragon_diff",
                "baron_diff",
                "tower_diff",
                "inhib_diff",
                "gold_diff_10",
                "gold_diff_15",
                "gold_diff_20",
                "blue_kills",
                "red_kills",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            target_columns: vec!["gamelength".to_string(), "bResult".to_string()],
            test_size: 0.2,
            random_state: 42,
            scaling: ScalingSettings::default(),
            regression_models: RegressionParams::default(),
            classification_models: ClassificationParams::default(),
        }
    }
}

/// What to do with a feature that is constant in the training split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstantColumnPolicy {
    /// Keep the column, scale with std = 1 (centres it to zero)
    UnitVariance,
    /// Abort the stage with a numeric degeneracy error
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSettings {
    pub constant_columns: ConstantColumnPolicy,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            constant_columns: ConstantColumnPolicy::UnitVariance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionParams {
    pub ridge_alpha: f64,
    pub lasso_alpha: f64,
    pub lasso_max_iter: usize,
    pub rf_n_estimators: usize,
    pub rf_max_depth: usize,
    pub gb_n_estimators: usize,
    pub gb_learning_rate: f64,
    pub gb_max_depth: usize,
}

impl Default for RegressionParams {
    fn default() -> Self {
        Self {
            ridge_alpha: 1.0,
            lasso_alpha: 0.1,
            lasso_max_iter: 1000,
            rf_n_estimators: 100,
            rf_max_depth: 15,
            gb_n_estimators: 100,
            gb_learning_rate: 0.1,
            gb_max_depth: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvmKernel {
    Rbf,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationParams {
    pub lr_max_iter: usize,
    pub lr_c: f64,
    pub rf_n_estimators: usize,
    pub rf_max_depth: usize,
    pub gb_n_estimators: usize,
    pub gb_learning_rate: f64,
    pub gb_max_depth: usize,
    pub svm_kernel: SvmKernel,
    pub svm_c: f64,
    pub svm_max_iter: usize,
    /// Kernel row cache for SMO, in megabytes
    pub svm_cache_mb: usize,
}

impl Default for ClassificationParams {
    fn default() -> Self {
        Self {
            lr_max_iter: 1000,
            lr_c: 1.0,
            rf_n_estimators: 100,
            rf_max_depth: 15,
            gb_n_estimators: 100,
            gb_learning_rate: 0.1,
            gb_max_depth: 3,
            svm_kernel: SvmKernel::Rbf,
            svm_c: 1.0,
            svm_max_iter: 200,
            svm_cache_mb: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub top_features: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/08_reporting"),
            top_features: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/artifacts"),
        }
    }
}

/// Opaque settings handed to an external scheduler through `plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub schedule: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay_secs: 300,
            schedule: "@weekly".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model_options.regression_target(), "gamelength");
        assert_eq!(config.model_options.classification_target(), "bResult");
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = PipelineConfig::default();
        config.model_options.test_size = 1.0;
        config.model_options.target_columns = vec!["gamelength".to_string()];
        config.report.top_features = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("test_size"));
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let mut config = PipelineConfig::default();
        config.model_options.feature_columns.push("kill_diff".to_string());
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("kill_diff")));
    }

    #[test]
    fn test_zero_svm_cache_rejected() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.model_options.classification_models.svm_cache_mb, 200);
        config.model_options.classification_models.svm_cache_mb = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec!["classification_models.svm_cache_mb must be > 0".to_string()]);
    }

    #[test]
    fn test_target_as_feature_rejected() {
        let mut config = PipelineConfig::default();
        config.model_options.feature_columns.push("bResult".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = PipelineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[model_options.regression_models]"));
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.model_options.feature_columns, config.model_options.feature_columns);
        assert_eq!(parsed.model_options.scaling.constant_columns, ConstantColumnPolicy::UnitVariance);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let parsed: PipelineConfig = toml::from_str(
            "[model_options]\ntest_size = 0.3\n\n[model_options.classification_models]\nsvm_kernel = \"linear\"\n",
        )
        .unwrap();
        assert_eq!(parsed.model_options.test_size, 0.3);
        assert_eq!(parsed.model_options.random_state, 42);
        assert_eq!(parsed.model_options.classification_models.svm_kernel, SvmKernel::Linear);
        assert_eq!(parsed.model_options.regression_models.rf_max_depth, 15);
    }
}
