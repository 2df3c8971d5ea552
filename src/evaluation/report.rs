use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::evaluator::{ClassificationMetrics, RegressionMetrics};
use super::importance::{top_features, FeatureImportance};
use crate::error::{PipelineError, Result};

/// Model whose importances are used when the winner has none
pub const FALLBACK_IMPORTANCE_MODEL: &str = "random_forest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub best_model: String,
    pub best_r2: f64,
    pub best_rmse: f64,
    pub best_mae: f64,
    pub all_metrics: Vec<RegressionMetrics>,
    /// Model the top features were taken from
    pub importance_source: Option<String>,
    pub top_features: Option<Vec<FeatureImportance>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub best_model: String,
    pub best_accuracy: f64,
    pub best_f1: f64,
    pub best_auc: Option<f64>,
    pub all_metrics: Vec<ClassificationMetrics>,
    pub importance_source: Option<String>,
    pub top_features: Option<Vec<FeatureImportance>>,
}

fn select_top_features(
    best_model: &str,
    importances: &[FeatureImportance],
    n: usize,
) -> (Option<String>, Option<Vec<FeatureImportance>>) {
    for source in [best_model, FALLBACK_IMPORTANCE_MODEL] {
        let rows = top_features(importances, source, n);
        if !rows.is_empty() {
            return (Some(source.to_string()), Some(rows));
        }
    }
    (None, None)
}

/// `metrics` must already be ranked best first.
pub fn create_regression_report(
    metrics: &[RegressionMetrics],
    importances: &[FeatureImportance],
    top_n: usize,
    run_id: Uuid,
) -> Result<RegressionReport> {
    let best = metrics
        .first()
        .ok_or_else(|| PipelineError::Data("no regression metrics to report".to_string()))?;
    let (importance_source, top_features) = select_top_features(&best.model, importances, top_n);

    info!(
        "Regression report: best model {} (R2={:.4}, RMSE={:.2}, MAE={:.2})",
        best.model, best.test_r2, best.test_rmse, best.test_mae
    );
    Ok(RegressionReport {
        run_id,
        generated_at: Utc::now(),
        best_model: best.model.clone(),
        best_r2: best.test_r2,
        best_rmse: best.test_rmse,
        best_mae: best.test_mae,
        all_metrics: metrics.to_vec(),
        importance_source,
        top_features,
    })
}

/// `metrics` must already be ranked best first.
pub fn create_classification_report(
    metrics: &[ClassificationMetrics],
    importances: &[FeatureImportance],
    top_n: usize,
    run_id: Uuid,
) -> Result<ClassificationReport> {
    let best = metrics
        .first()
        .ok_or_else(|| PipelineError::Data("no classification metrics to report".to_string()))?;
    let (importance_source, top_features) = select_top_features(&best.model, importances, top_n);

    info!(
        "Classification report: best model {} (accuracy={:.4}, F1={:.4})",
        best.model, best.test_accuracy, best.f1_score
    );
    Ok(ClassificationReport {
        run_id,
        generated_at: Utc::now(),
        best_model: best.model.clone(),
        best_accuracy: best.test_accuracy,
        best_f1: best.f1_score,
        best_auc: best.auc_roc,
        all_metrics: metrics.to_vec(),
        importance_source,
        top_features,
    })
}

/// Pretty JSON into `dir/file_name`, creating `dir` if needed.
pub fn write_json_report<T: Serialize>(report: &T, dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let mut file = File::create(&path)?;
    file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;
    info!("Report written to {}", path.display());
    Ok(path)
}

pub fn write_regression_metrics_csv(metrics: &[RegressionMetrics], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    writeln!(file, "model,train_rmse,test_rmse,train_mae,test_mae,train_r2,test_r2")?;
    for m in metrics {
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.model, m.train_rmse, m.test_rmse, m.train_mae, m.test_mae, m.train_r2, m.test_r2
        )?;
    }
    info!("Exported {} regression metric rows to {}", metrics.len(), path.display());
    Ok(())
}

pub fn write_classification_metrics_csv(metrics: &[ClassificationMetrics], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    writeln!(file, "model,train_accuracy,test_accuracy,precision,recall,f1_score,auc_roc")?;
    for m in metrics {
        // empty cell when AUC is undefined
        let auc = m.auc_roc.map(|v| format!("{:.6}", v)).unwrap_or_default();
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
            m.model, m.train_accuracy, m.test_accuracy, m.precision, m.recall, m.f1_score, auc
        )?;
    }
    info!("Exported {} classification metric rows to {}", metrics.len(), path.display());
    Ok(())
}

pub fn write_importance_csv(importances: &[FeatureImportance], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    writeln!(file, "model,feature,importance")?;
    for row in importances {
        writeln!(file, "{},{},{:.6}", row.model, row.feature, row.importance)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regression_metrics() -> Vec<RegressionMetrics> {
        vec![
            RegressionMetrics {
                model: "ridge".into(),
                train_rmse: 1.0,
                test_rmse: 2.0,
                train_mae: 0.5,
                test_mae: 1.5,
                train_r2: 0.95,
                test_r2: 0.9,
            },
            RegressionMetrics {
                model: "random_forest".into(),
                train_rmse: 0.5,
                test_rmse: 3.0,
                train_mae: 0.2,
                test_mae: 2.0,
                train_r2: 0.99,
                test_r2: 0.8,
            },
        ]
    }

    fn importances() -> Vec<FeatureImportance> {
        ["kill_diff", "gold_diff_20", "tower_diff"]
            .iter()
            .zip([0.5, 0.3, 0.2])
            .map(|(f, v)| FeatureImportance {
                model: "random_forest".into(),
                feature: f.to_string(),
                importance: v,
            })
            .collect()
    }

    #[test]
    fn test_linear_winner_falls_back_to_forest_importances() {
        let report = create_regression_report(&regression_metrics(), &importances(), 2, Uuid::new_v4()).unwrap();
        assert_eq!(report.best_model, "ridge");
        assert_eq!(report.best_r2, 0.9);
        assert_eq!(report.importance_source.as_deref(), Some("random_forest"));
        let top = report.top_features.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].feature, "kill_diff");
    }

    #[test]
    fn test_tree_winner_uses_its_own_importances() {
        let mut metrics = regression_metrics();
        metrics.insert(
            0,
            RegressionMetrics {
                model: "gradient_boosting".into(),
                train_rmse: 0.4,
                test_rmse: 1.2,
                train_mae: 0.3,
                test_mae: 0.9,
                train_r2: 0.99,
                test_r2: 0.95,
            },
        );
        // deliberately unsorted so the ordering comes from the report
        let mut rows = importances();
        rows.extend([("tower_diff", 0.1), ("kill_diff", 0.6), ("gold_diff_20", 0.3)].iter().map(|(f, v)| {
            FeatureImportance {
                model: "gradient_boosting".into(),
                feature: f.to_string(),
                importance: *v,
            }
        }));

        let report = create_regression_report(&metrics, &rows, 3, Uuid::new_v4()).unwrap();
        assert_eq!(report.best_model, "gradient_boosting");
        assert_eq!(report.importance_source.as_deref(), Some("gradient_boosting"));
        let top = report.top_features.unwrap();
        let features: Vec<&str> = top.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(features, vec!["kill_diff", "gold_diff_20", "tower_diff"]);
        assert!(top.iter().all(|r| r.model == "gradient_boosting"));
        assert!(top.windows(2).all(|w| w[0].importance >= w[1].importance));
    }

    #[test]
    fn test_no_importances_gives_none() {
        let report = create_regression_report(&regression_metrics(), &[], 5, Uuid::new_v4()).unwrap();
        assert!(report.top_features.is_none());
        assert!(report.importance_source.is_none());
    }

    #[test]
    fn test_empty_metrics_rejected() {
        assert!(create_classification_report(&[], &[], 5, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_classification_csv_leaves_missing_auc_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("classification_metrics.csv");
        let metrics = vec![ClassificationMetrics {
            model: "svm".into(),
            train_accuracy: 1.0,
            test_accuracy: 0.5,
            precision: 0.5,
            recall: 1.0,
            f1_score: 2.0 / 3.0,
            auc_roc: None,
        }];
        write_classification_metrics_csv(&metrics, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "model,train_accuracy,test_accuracy,precision,recall,f1_score,auc_roc");
        assert_eq!(lines[1], "svm,1.000000,0.500000,0.500000,1.000000,0.666667,");
    }

    #[test]
    fn test_json_report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let report = create_regression_report(&regression_metrics(), &importances(), 5, Uuid::new_v4()).unwrap();
        let path = write_json_report(&report, dir.path(), "regression_report.json").unwrap();

        let parsed: RegressionReport = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.best_model, "ridge");
        assert_eq!(parsed.all_metrics.len(), 2);
        assert_eq!(parsed.run_id, report.run_id);
    }
}
