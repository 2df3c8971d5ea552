use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::ml::{Estimator, ModelSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub model: String,
    pub feature: String,
    pub importance: f64,
}

/// One row per (model, feature) for every model that exposes importances,
/// sorted by importance within each model. Other models are left out.
pub fn feature_importance(models: &ModelSet, feature_names: &[String]) -> Result<Vec<FeatureImportance>> {
    let mut rows = Vec::new();
    for model in models.iter() {
        let Some(importances) = model.estimator.feature_importances() else {
            continue;
        };
        if importances.len() != feature_names.len() {
            return Err(PipelineError::shape(
                format!("{} importances (one per feature name)", feature_names.len()),
                format!("{} from model '{}'", importances.len(), model.name()),
            ));
        }

        let mut model_rows: Vec<FeatureImportance> = feature_names
            .iter()
            .zip(importances)
            .map(|(feature, importance)| FeatureImportance {
                model: model.name().to_string(),
                feature: feature.clone(),
                importance: *importance,
            })
            .collect();
        model_rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        rows.extend(model_rows);
    }
    Ok(rows)
}

/// Highest-importance features of one model, best first.
pub fn top_features(importances: &[FeatureImportance], model: &str, n: usize) -> Vec<FeatureImportance> {
    let mut rows: Vec<FeatureImportance> = importances.iter().filter(|r| r.model == model).cloned().collect();
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    rows.truncate(n);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::RandomForest;
    use crate::ml::linear::LinearRegression;
    use crate::ml::model::{ModelEstimator, ModelKind, Task, TrainedModel};
    use ndarray::{Array1, Array2};

    fn trained_set() -> ModelSet {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 });
        let y: Array1<f64> = x.column(0).mapv(|v| v * 2.0);

        let mut set = ModelSet::new(Task::Regression);
        for (kind, mut estimator) in [
            (ModelKind::LinearRegression, ModelEstimator::Linear(LinearRegression::ordinary())),
            (
                ModelKind::RandomForest,
                ModelEstimator::RandomForest(RandomForest::new_regressor(5).with_random_state(1)),
            ),
        ] {
            estimator.fit(&x, &y).unwrap();
            set.push(TrainedModel {
                task: Task::Regression,
                kind,
                estimator,
            })
            .unwrap();
        }
        set
    }

    #[test]
    fn test_only_tree_models_reported() {
        let names = vec!["kill_diff".to_string(), "red_kills".to_string()];
        let rows = feature_importance(&trained_set(), &names).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.model == "random_forest"));
        assert_eq!(rows[0].feature, "kill_diff");
        assert!(rows[0].importance >= rows[1].importance);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let names = vec!["kill_diff".to_string()];
        match feature_importance(&trained_set(), &names) {
            Err(PipelineError::DataShape { expected, actual }) => {
                assert!(expected.starts_with("1 importances"), "{}", expected);
                assert!(actual.starts_with("2 from model 'random_forest'"), "{}", actual);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_top_features_truncates() {
        let rows = vec![
            FeatureImportance { model: "a".into(), feature: "x".into(), importance: 0.2 },
            FeatureImportance { model: "a".into(), feature: "y".into(), importance: 0.7 },
            FeatureImportance { model: "b".into(), feature: "x".into(), importance: 0.9 },
            FeatureImportance { model: "a".into(), feature: "z".into(), importance: 0.1 },
        ];
        let top = top_features(&rows, "a", 2);
        let features: Vec<&str> = top.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(features, vec!["y", "x"]);
    }
}
