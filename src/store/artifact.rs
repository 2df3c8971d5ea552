use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::{EventTable, MatchTable};
use crate::error::{PipelineError, Result};
use crate::evaluation::{ClassificationMetrics, ClassificationReport, FeatureImportance, RegressionMetrics, RegressionReport};
use crate::features::{FeatureMatrix, ModelInput, StandardScaler};
use crate::ml::{ModelSet, PredictionSet};

/// Every value a stage can read from or write to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    MatchTable(MatchTable),
    EventTable(EventTable),
    ModelInput(ModelInput),
    FeatureMatrix(FeatureMatrix),
    Vector(Array1<f64>),
    Scaler(StandardScaler),
    ModelSet(ModelSet),
    Predictions(PredictionSet),
    RegressionMetrics(Vec<RegressionMetrics>),
    ClassificationMetrics(Vec<ClassificationMetrics>),
    FeatureImportances(Vec<FeatureImportance>),
    RegressionReport(RegressionReport),
    ClassificationReport(ClassificationReport),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::MatchTable(_) => "match_table",
            Artifact::EventTable(_) => "event_table",
            Artifact::ModelInput(_) => "model_input",
            Artifact::FeatureMatrix(_) => "feature_matrix",
            Artifact::Vector(_) => "vector",
            Artifact::Scaler(_) => "scaler",
            Artifact::ModelSet(_) => "model_set",
            Artifact::Predictions(_) => "predictions",
            Artifact::RegressionMetrics(_) => "regression_metrics",
            Artifact::ClassificationMetrics(_) => "classification_metrics",
            Artifact::FeatureImportances(_) => "feature_importances",
            Artifact::RegressionReport(_) => "regression_report",
            Artifact::ClassificationReport(_) => "classification_report",
        }
    }
}

/// Typed extraction of a named artifact; the name only feeds the error.
pub trait FromArtifact: Sized {
    const KIND: &'static str;

    fn from_artifact(name: &str, artifact: Artifact) -> Result<Self>;
}

macro_rules! artifact_conversions {
    ($($variant:ident => $ty:ty, $kind:literal;)*) => {
        $(
            impl From<$ty> for Artifact {
                fn from(value: $ty) -> Self {
                    Artifact::$variant(value)
                }
            }

            impl FromArtifact for $ty {
                const KIND: &'static str = $kind;

                fn from_artifact(name: &str, artifact: Artifact) -> Result<Self> {
                    match artifact {
                        Artifact::$variant(value) => Ok(value),
                        other => Err(PipelineError::Artifact {
                            name: name.to_string(),
                            expected: Self::KIND,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

artifact_conversions! {
    MatchTable => MatchTable, "match_table";
    EventTable => EventTable, "event_table";
    ModelInput => ModelInput, "model_input";
    FeatureMatrix => FeatureMatrix, "feature_matrix";
    Vector => Array1<f64>, "vector";
    Scaler => StandardScaler, "scaler";
    ModelSet => ModelSet, "model_set";
    Predictions => PredictionSet, "predictions";
    RegressionMetrics => Vec<RegressionMetrics>, "regression_metrics";
    ClassificationMetrics => Vec<ClassificationMetrics>, "classification_metrics";
    FeatureImportances => Vec<FeatureImportance>, "feature_importances";
    RegressionReport => RegressionReport, "regression_report";
    ClassificationReport => ClassificationReport, "classification_report";
}
