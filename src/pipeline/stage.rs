use ndarray::Array1;
use serde::Serialize;
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::data::{load_events, load_matches, read_csv, EventTable, MatchTable};
use crate::error::Result;
use crate::evaluation::{
    create_classification_report, create_regression_report, evaluate_classification, evaluate_regression,
    feature_importance, write_classification_metrics_csv, write_importance_csv, write_json_report,
    write_regression_metrics_csv, ClassificationMetrics, FeatureImportance, RegressionMetrics,
};
use crate::features::{
    aggregate_gold, aggregate_kills, aggregate_monsters, aggregate_structures, scale_features, select_features,
    split_data, FeatureMatrix, GoldSpec, ModelInput,
};
use crate::ml::{
    predict_classification, predict_regression, train_classification_models, train_regression_models, ModelSet,
    PredictionSet,
};
use crate::store::{ArtifactStore, StoreExt};

/// Artifact names, shared by stage declarations and the CLI.
pub mod names {
    pub const MATCHINFO: &str = "matchinfo";
    pub const KILLS: &str = "kills";
    pub const MONSTERS: &str = "monsters";
    pub const STRUCTURES: &str = "structures";
    pub const GOLD: &str = "gold";
    pub const FEATURES_WITH_KILLS: &str = "features_with_kills";
    pub const FEATURES_WITH_MONSTERS: &str = "features_with_monsters";
    pub const FEATURES_WITH_STRUCTURES: &str = "features_with_structures";
    pub const FEATURES_COMPLETE: &str = "features_complete";
    pub const MODEL_INPUT_TABLE: &str = "model_input_table";
    pub const X_TRAIN: &str = "X_train";
    pub const X_TEST: &str = "X_test";
    pub const Y_REG_TRAIN: &str = "y_reg_train";
    pub const Y_REG_TEST: &str = "y_reg_test";
    pub const Y_CLS_TRAIN: &str = "y_cls_train";
    pub const Y_CLS_TEST: &str = "y_cls_test";
    pub const X_TRAIN_SCALED: &str = "X_train_scaled";
    pub const X_TEST_SCALED: &str = "X_test_scaled";
    pub const SCALER: &str = "scaler";
    pub const REGRESSION_MODELS: &str = "regression_models";
    pub const REGRESSION_PREDICTIONS: &str = "regression_predictions";
    pub const CLASSIFICATION_MODELS: &str = "classification_models";
    pub const CLASSIFICATION_PREDICTIONS: &str = "classification_predictions";
    pub const REGRESSION_METRICS: &str = "regression_metrics";
    pub const REGRESSION_FEATURE_IMPORTANCE: &str = "regression_feature_importance";
    pub const REGRESSION_REPORT: &str = "regression_report";
    pub const CLASSIFICATION_METRICS: &str = "classification_metrics";
    pub const CLASSIFICATION_FEATURE_IMPORTANCE: &str = "classification_feature_importance";
    pub const CLASSIFICATION_REPORT: &str = "classification_report";
}

use names::*;

/// What a stage gets to work with
pub struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a mut dyn ArtifactStore,
    pub run_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IngestRawTables,
    AggregateKills,
    AggregateMonsters,
    AggregateStructures,
    AggregateGold,
    SelectFeatures,
    SplitData,
    ScaleFeatures,
    TrainRegressionModels,
    MakeRegressionPredictions,
    TrainClassificationModels,
    MakeClassificationPredictions,
    EvaluateRegression,
    RegressionFeatureImportance,
    CreateRegressionReport,
    EvaluateClassification,
    ClassificationFeatureImportance,
    CreateClassificationReport,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 18] = [
        Stage::IngestRawTables,
        Stage::AggregateKills,
        Stage::AggregateMonsters,
        Stage::AggregateStructures,
        Stage::AggregateGold,
        Stage::SelectFeatures,
        Stage::SplitData,
        Stage::ScaleFeatures,
        Stage::TrainRegressionModels,
        Stage::MakeRegressionPredictions,
        Stage::TrainClassificationModels,
        Stage::MakeClassificationPredictions,
        Stage::EvaluateRegression,
        Stage::RegressionFeatureImportance,
        Stage::CreateRegressionReport,
        Stage::EvaluateClassification,
        Stage::ClassificationFeatureImportance,
        Stage::CreateClassificationReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::IngestRawTables => "ingest_raw_tables",
            Stage::AggregateKills => "aggregate_kills",
            Stage::AggregateMonsters => "aggregate_monsters",
            Stage::AggregateStructures => "aggregate_structures",
            Stage::AggregateGold => "aggregate_gold",
            Stage::SelectFeatures => "select_features",
            Stage::SplitData => "split_data",
            Stage::ScaleFeatures => "scale_features",
            Stage::TrainRegressionModels => "train_regression_models",
            Stage::MakeRegressionPredictions => "make_regression_predictions",
            Stage::TrainClassificationModels => "train_classification_models",
            Stage::MakeClassificationPredictions => "make_classification_predictions",
            Stage::EvaluateRegression => "evaluate_regression",
            Stage::RegressionFeatureImportance => "regression_feature_importance",
            Stage::CreateRegressionReport => "create_regression_report",
            Stage::EvaluateClassification => "evaluate_classification",
            Stage::ClassificationFeatureImportance => "classification_feature_importance",
            Stage::CreateClassificationReport => "create_classification_report",
        }
    }

    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            Stage::IngestRawTables => &[],
            Stage::AggregateKills => &[MATCHINFO, KILLS],
            Stage::AggregateMonsters => &[FEATURES_WITH_KILLS, MONSTERS],
            Stage::AggregateStructures => &[FEATURES_WITH_MONSTERS, STRUCTURES],
            Stage::AggregateGold => &[FEATURES_WITH_STRUCTURES, GOLD],
            Stage::SelectFeatures => &[FEATURES_COMPLETE],
            Stage::SplitData => &[MODEL_INPUT_TABLE],
            Stage::ScaleFeatures => &[X_TRAIN, X_TEST],
            Stage::TrainRegressionModels => &[X_TRAIN_SCALED, Y_REG_TRAIN],
            Stage::MakeRegressionPredictions => &[REGRESSION_MODELS, X_TRAIN_SCALED, X_TEST_SCALED],
            Stage::TrainClassificationModels => &[X_TRAIN_SCALED, Y_CLS_TRAIN],
            Stage::MakeClassificationPredictions => &[CLASSIFICATION_MODELS, X_TRAIN_SCALED, X_TEST_SCALED],
            Stage::EvaluateRegression => &[REGRESSION_PREDICTIONS, Y_REG_TRAIN, Y_REG_TEST],
            Stage::RegressionFeatureImportance => &[REGRESSION_MODELS, X_TRAIN_SCALED],
            Stage::CreateRegressionReport => &[REGRESSION_METRICS, REGRESSION_FEATURE_IMPORTANCE],
            Stage::EvaluateClassification => &[CLASSIFICATION_PREDICTIONS, Y_CLS_TRAIN, Y_CLS_TEST],
            Stage::ClassificationFeatureImportance => &[CLASSIFICATION_MODELS, X_TRAIN_SCALED],
            Stage::CreateClassificationReport => &[CLASSIFICATION_METRICS, CLASSIFICATION_FEATURE_IMPORTANCE],
        }
    }

    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            Stage::IngestRawTables => &[MATCHINFO, KILLS, MONSTERS, STRUCTURES, GOLD],
            Stage::AggregateKills => &[FEATURES_WITH_KILLS],
            Stage::AggregateMonsters => &[FEATURES_WITH_MONSTERS],
            Stage::AggregateStructures => &[FEATURES_WITH_STRUCTURES],
            Stage::AggregateGold => &[FEATURES_COMPLETE],
            Stage::SelectFeatures => &[MODEL_INPUT_TABLE],
            Stage::SplitData => &[X_TRAIN, X_TEST, Y_REG_TRAIN, Y_REG_TEST, Y_CLS_TRAIN, Y_CLS_TEST],
            Stage::ScaleFeatures => &[X_TRAIN_SCALED, X_TEST_SCALED, SCALER],
            Stage::TrainRegressionModels => &[REGRESSION_MODELS],
            Stage::MakeRegressionPredictions => &[REGRESSION_PREDICTIONS],
            Stage::TrainClassificationModels => &[CLASSIFICATION_MODELS],
            Stage::MakeClassificationPredictions => &[CLASSIFICATION_PREDICTIONS],
            Stage::EvaluateRegression => &[REGRESSION_METRICS],
            Stage::RegressionFeatureImportance => &[REGRESSION_FEATURE_IMPORTANCE],
            Stage::CreateRegressionReport => &[REGRESSION_REPORT],
            Stage::EvaluateClassification => &[CLASSIFICATION_METRICS],
            Stage::ClassificationFeatureImportance => &[CLASSIFICATION_FEATURE_IMPORTANCE],
            Stage::CreateClassificationReport => &[CLASSIFICATION_REPORT],
        }
    }

    pub fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let config = ctx.config;
        let run_id = ctx.run_id;
        let options = &config.model_options;
        let store = &mut *ctx.store;

        match self {
            Stage::IngestRawTables => ingest(config, store),
            Stage::AggregateKills => {
                let matches: MatchTable = store.load(MATCHINFO)?;
                let kills: EventTable = store.load(KILLS)?;
                store.save(FEATURES_WITH_KILLS, aggregate_kills(&matches, &kills)?)
            }
            Stage::AggregateMonsters => {
                let features: MatchTable = store.load(FEATURES_WITH_KILLS)?;
                let monsters: EventTable = store.load(MONSTERS)?;
                store.save(FEATURES_WITH_MONSTERS, aggregate_monsters(&features, &monsters)?)
            }
            Stage::AggregateStructures => {
                let features: MatchTable = store.load(FEATURES_WITH_MONSTERS)?;
                let structures: EventTable = store.load(STRUCTURES)?;
                store.save(FEATURES_WITH_STRUCTURES, aggregate_structures(&features, &structures)?)
            }
            Stage::AggregateGold => {
                let features: MatchTable = store.load(FEATURES_WITH_STRUCTURES)?;
                let gold: EventTable = store.load(GOLD)?;
                store.save(FEATURES_COMPLETE, aggregate_gold(&features, &gold, &GoldSpec::default())?)
            }
            Stage::SelectFeatures => {
                let table: MatchTable = store.load(FEATURES_COMPLETE)?;
                store.save(MODEL_INPUT_TABLE, select_features(&table, options)?)
            }
            Stage::SplitData => {
                let input: ModelInput = store.load(MODEL_INPUT_TABLE)?;
                let split = split_data(&input, options)?;
                store.save(X_TRAIN, split.x_train)?;
                store.save(X_TEST, split.x_test)?;
                store.save(Y_REG_TRAIN, split.y_reg_train)?;
                store.save(Y_REG_TEST, split.y_reg_test)?;
                store.save(Y_CLS_TRAIN, split.y_cls_train)?;
                store.save(Y_CLS_TEST, split.y_cls_test)
            }
            Stage::ScaleFeatures => {
                let x_train: FeatureMatrix = store.load(X_TRAIN)?;
                let x_test: FeatureMatrix = store.load(X_TEST)?;
                let (scaled, scaler) = scale_features(&x_train, &x_test, options.scaling.constant_columns)?;
                store.save(X_TRAIN_SCALED, scaled.x_train)?;
                store.save(X_TEST_SCALED, scaled.x_test)?;
                store.save(SCALER, scaler)
            }
            Stage::TrainRegressionModels => {
                let x: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                let y: Array1<f64> = store.load(Y_REG_TRAIN)?;
                store.save(REGRESSION_MODELS, train_regression_models(&x.values, &y, options)?)
            }
            Stage::MakeRegressionPredictions => {
                let models: ModelSet = store.load(REGRESSION_MODELS)?;
                let x_train: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                let x_test: FeatureMatrix = store.load(X_TEST_SCALED)?;
                store.save(
                    REGRESSION_PREDICTIONS,
                    predict_regression(&models, &x_train.values, &x_test.values)?,
                )
            }
            Stage::TrainClassificationModels => {
                let x: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                let y: Array1<f64> = store.load(Y_CLS_TRAIN)?;
                store.save(CLASSIFICATION_MODELS, train_classification_models(&x.values, &y, options)?)
            }
            Stage::MakeClassificationPredictions => {
                let models: ModelSet = store.load(CLASSIFICATION_MODELS)?;
                let x_train: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                let x_test: FeatureMatrix = store.load(X_TEST_SCALED)?;
                store.save(
                    CLASSIFICATION_PREDICTIONS,
                    predict_classification(&models, &x_train.values, &x_test.values)?,
                )
            }
            Stage::EvaluateRegression => {
                let predictions: PredictionSet = store.load(REGRESSION_PREDICTIONS)?;
                let y_train: Array1<f64> = store.load(Y_REG_TRAIN)?;
                let y_test: Array1<f64> = store.load(Y_REG_TEST)?;
                store.save(REGRESSION_METRICS, evaluate_regression(&predictions, &y_train, &y_test)?)
            }
            Stage::RegressionFeatureImportance => {
                let models: ModelSet = store.load(REGRESSION_MODELS)?;
                let x: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                store.save(REGRESSION_FEATURE_IMPORTANCE, feature_importance(&models, &x.feature_names)?)
            }
            Stage::CreateRegressionReport => {
                let metrics: Vec<RegressionMetrics> = store.load(REGRESSION_METRICS)?;
                let importances: Vec<FeatureImportance> = store.load(REGRESSION_FEATURE_IMPORTANCE)?;
                let report = create_regression_report(&metrics, &importances, config.report.top_features, run_id)?;

                let dir = &config.report.output_dir;
                write_json_report(&report, dir, "regression_report.json")?;
                write_regression_metrics_csv(&metrics, &dir.join("regression_metrics.csv"))?;
                write_importance_csv(&importances, &dir.join("regression_feature_importance.csv"))?;
                store.save(REGRESSION_REPORT, report)
            }
            Stage::EvaluateClassification => {
                let predictions: PredictionSet = store.load(CLASSIFICATION_PREDICTIONS)?;
                let y_train: Array1<f64> = store.load(Y_CLS_TRAIN)?;
                let y_test: Array1<f64> = store.load(Y_CLS_TEST)?;
                store.save(
                    CLASSIFICATION_METRICS,
                    evaluate_classification(&predictions, &y_train, &y_test)?,
                )
            }
            Stage::ClassificationFeatureImportance => {
                let models: ModelSet = store.load(CLASSIFICATION_MODELS)?;
                let x: FeatureMatrix = store.load(X_TRAIN_SCALED)?;
                store.save(CLASSIFICATION_FEATURE_IMPORTANCE, feature_importance(&models, &x.feature_names)?)
            }
            Stage::CreateClassificationReport => {
                let metrics: Vec<ClassificationMetrics> = store.load(CLASSIFICATION_METRICS)?;
                let importances: Vec<FeatureImportance> = store.load(CLASSIFICATION_FEATURE_IMPORTANCE)?;
                let report =
                    create_classification_report(&metrics, &importances, config.report.top_features, run_id)?;

                let dir = &config.report.output_dir;
                write_json_report(&report, dir, "classification_report.json")?;
                write_classification_metrics_csv(&metrics, &dir.join("classification_metrics.csv"))?;
                write_importance_csv(&importances, &dir.join("classification_feature_importance.csv"))?;
                store.save(CLASSIFICATION_REPORT, report)
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read the five cleaned exports into the store.
fn ingest(config: &PipelineConfig, store: &mut dyn ArtifactStore) -> Result<()> {
    let data = &config.data;
    info!("Ingesting raw tables...");

    let matches = load_matches(
        &read_csv(&data.matchinfo_path)?,
        &data.key_column,
        &config.model_options.target_columns,
    )?;
    store.save(MATCHINFO, matches)?;

    for (name, path) in [
        (KILLS, &data.kills_path),
        (MONSTERS, &data.monsters_path),
        (STRUCTURES, &data.structures_path),
    ] {
        let events = load_events(&read_csv(path)?, &data.key_column, Some(data.team_column.as_str()), None)?;
        info!("Loaded {} {} rows from {}", events.len(), name, path.display());
        store.save(name, events)?;
    }

    let gold = load_events(&read_csv(&data.gold_path)?, &data.key_column, None, Some(data.type_column.as_str()))?;
    info!("Loaded {} gold rows from {}", gold.len(), data.gold_path.display());
    store.save(GOLD, gold)
}
