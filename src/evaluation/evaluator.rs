use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;

use super::metrics::{accuracy, f1, mae, precision, r2, recall, rmse, roc_auc};
use crate::error::{PipelineError, Result};
use crate::ml::PredictionSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub model: String,
    pub train_rmse: f64,
    pub test_rmse: f64,
    pub train_mae: f64,
    pub test_mae: f64,
    pub train_r2: f64,
    pub test_r2: f64,
}

/// Precision, recall, F1 and AUC are computed on the test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub model: String,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub auc_roc: Option<f64>,
}

fn check_length(model: &str, partition: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::shape(
            format!("{} {} predictions", expected, partition),
            format!("{} from model '{}'", actual, model),
        ));
    }
    Ok(())
}

/// Ranked best first: higher test R², then lower test RMSE.
pub fn evaluate_regression(
    predictions: &PredictionSet,
    y_train: &Array1<f64>,
    y_test: &Array1<f64>,
) -> Result<Vec<RegressionMetrics>> {
    let mut results = Vec::with_capacity(predictions.len());
    for p in &predictions.models {
        check_length(&p.model, "train", y_train.len(), p.train.len())?;
        check_length(&p.model, "test", y_test.len(), p.test.len())?;

        let metrics = RegressionMetrics {
            model: p.model.clone(),
            train_rmse: rmse(y_train, &p.train),
            test_rmse: rmse(y_test, &p.test),
            train_mae: mae(y_train, &p.train),
            test_mae: mae(y_test, &p.test),
            train_r2: r2(y_train, &p.train),
            test_r2: r2(y_test, &p.test),
        };
        info!(
            "{}: test R2={:.4}, RMSE={:.2}, MAE={:.2}",
            metrics.model, metrics.test_r2, metrics.test_rmse, metrics.test_mae
        );
        results.push(metrics);
    }

    results.sort_by(|a, b| {
        compare_metric(a.test_r2, b.test_r2, true).then_with(|| compare_metric(a.test_rmse, b.test_rmse, false))
    });
    if let Some(best) = results.first() {
        info!("Best regression model: {} (R2={:.4})", best.model, best.test_r2);
    }
    Ok(results)
}

/// Ranked best first: higher F1, then higher AUC with a missing AUC last.
pub fn evaluate_classification(
    predictions: &PredictionSet,
    y_train: &Array1<f64>,
    y_test: &Array1<f64>,
) -> Result<Vec<ClassificationMetrics>> {
    let mut results = Vec::with_capacity(predictions.len());
    for p in &predictions.models {
        check_length(&p.model, "train", y_train.len(), p.train.len())?;
        check_length(&p.model, "test", y_test.len(), p.test.len())?;
        let test_proba = p
            .test_proba
            .as_ref()
            .ok_or_else(|| PipelineError::Data(format!("model '{}' has no test probabilities", p.model)))?;
        check_length(&p.model, "test probability", y_test.len(), test_proba.len())?;

        let metrics = ClassificationMetrics {
            model: p.model.clone(),
            train_accuracy: accuracy(y_train, &p.train),
            test_accuracy: accuracy(y_test, &p.test),
            precision: precision(y_test, &p.test),
            recall: recall(y_test, &p.test),
            f1_score: f1(y_test, &p.test),
            auc_roc: roc_auc(y_test, test_proba),
        };
        match metrics.auc_roc {
            Some(auc) => info!(
                "{}: test accuracy={:.4}, F1={:.4}, AUC={:.4}",
                metrics.model, metrics.test_accuracy, metrics.f1_score, auc
            ),
            None => info!(
                "{}: test accuracy={:.4}, F1={:.4}, AUC undefined (single class in test split)",
                metrics.model, metrics.test_accuracy, metrics.f1_score
            ),
        }
        results.push(metrics);
    }

    results.sort_by(|a, b| {
        compare_metric(a.f1_score, b.f1_score, true).then_with(|| compare_auc(a.auc_roc, b.auc_roc))
    });
    if let Some(best) = results.first() {
        info!("Best classification model: {} (F1={:.4})", best.model, best.f1_score);
    }
    Ok(results)
}

/// Best first for one metric; NaN always sorts last.
fn compare_metric(a: f64, b: f64, higher_is_better: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if higher_is_better => b.total_cmp(&a),
        (false, false) => a.total_cmp(&b),
    }
}

/// Orders a before b when a has the larger AUC
fn compare_auc(a: Option<f64>, b: Option<f64>) -> Ordering {
    compare_metric(a.unwrap_or(f64::NAN), b.unwrap_or(f64::NAN), true)
}
