use ndarray::{Array1, Array2};
use std::time::Instant;
use tracing::info;

use super::boosting::GradientBoosting;
use super::forest::RandomForest;
use super::linear::{LassoRegression, LinearRegression};
use super::logistic::LogisticRegression;
use super::model::{Estimator, ModelEstimator, ModelKind, ModelSet, Task, TrainedModel};
use super::naive_bayes::GaussianNaiveBayes;
use super::svm::SupportVectorClassifier;
use crate::config::ModelOptions;
use crate::error::Result;

/// Regression roster, in training order
pub fn regression_roster(options: &ModelOptions) -> Vec<(ModelKind, ModelEstimator)> {
    let params = &options.regression_models;
    let seed = options.random_state;
    vec![
        (ModelKind::LinearRegression, ModelEstimator::Linear(LinearRegression::ordinary())),
        (ModelKind::Ridge, ModelEstimator::Linear(LinearRegression::ridge(params.ridge_alpha))),
        (
            ModelKind::Lasso,
            ModelEstimator::Lasso(LassoRegression::new(params.lasso_alpha, params.lasso_max_iter)),
        ),
        (
            ModelKind::RandomForest,
            ModelEstimator::RandomForest(
                RandomForest::new_regressor(params.rf_n_estimators)
                    .with_max_depth(params.rf_max_depth)
                    .with_random_state(seed),
            ),
        ),
        (
            ModelKind::GradientBoosting,
            ModelEstimator::GradientBoosting(
                GradientBoosting::new_regressor(params.gb_n_estimators, params.gb_learning_rate)
                    .with_max_depth(params.gb_max_depth)
                    .with_random_state(seed),
            ),
        ),
    ]
}

/// Classification roster, in training order
pub fn classification_roster(options: &ModelOptions) -> Vec<(ModelKind, ModelEstimator)> {
    let params = &options.classification_models;
    let seed = options.random_state;
    vec![
        (
            ModelKind::LogisticRegression,
            ModelEstimator::Logistic(LogisticRegression::new(params.lr_c, params.lr_max_iter)),
        ),
        (
            ModelKind::RandomForest,
            ModelEstimator::RandomForest(
                RandomForest::new_classifier(params.rf_n_estimators)
                    .with_max_depth(params.rf_max_depth)
                    .with_random_state(seed),
            ),
        ),
        (
            ModelKind::GradientBoosting,
            ModelEstimator::GradientBoosting(
                GradientBoosting::new_classifier(params.gb_n_estimators, params.gb_learning_rate)
                    .with_max_depth(params.gb_max_depth)
                    .with_random_state(seed),
            ),
        ),
        (
            ModelKind::Svm,
            ModelEstimator::Svm(
                SupportVectorClassifier::new(params.svm_kernel, params.svm_c, params.svm_max_iter)
                    .with_cache_size(params.svm_cache_mb),
            ),
        ),
        (ModelKind::NaiveBayes, ModelEstimator::NaiveBayes(GaussianNaiveBayes::new())),
    ]
}

pub fn train_regression_models(x: &Array2<f64>, y: &Array1<f64>, options: &ModelOptions) -> Result<ModelSet> {
    train_roster(Task::Regression, regression_roster(options), x, y)
}

pub fn train_classification_models(x: &Array2<f64>, y: &Array1<f64>, options: &ModelOptions) -> Result<ModelSet> {
    train_roster(Task::Classification, classification_roster(options), x, y)
}

/// Fit every model in order; the first failure aborts.
fn train_roster(
    task: Task,
    roster: Vec<(ModelKind, ModelEstimator)>,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<ModelSet> {
    info!("Training {} {} models on {} rows", roster.len(), task.as_str(), x.nrows());
    let mut models = ModelSet::new(task);

    for (kind, mut estimator) in roster {
        info!("Training {}...", kind);
        let started = Instant::now();
        estimator.fit(x, y)?;
        info!("{} trained in {:.2?}", kind, started.elapsed());
        if let Some(report) = estimator.training_report() {
            info!(
                "{}: {} samples, {:.1}% training accuracy, {}/{} blue wins, {} iterations",
                kind,
                report.samples,
                report.accuracy * 100.0,
                report.wins_in_data,
                report.samples,
                report.iterations
            );
        }
        models.push(TrainedModel { task, kind, estimator })?;
    }
    info!("Trained {} models: {}", task.as_str(), models.names().join(", "));
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn options() -> ModelOptions {
        let mut options = ModelOptions::default();
        options.regression_models.rf_n_estimators = 10;
        options.regression_models.gb_n_estimators = 20;
        options.classification_models.rf_n_estimators = 10;
        options.classification_models.gb_n_estimators = 20;
        options
    }

    fn dataset() -> Array2<f64> {
        Array2::from_shape_fn((40, 3), |(i, j)| match j {
            0 => i as f64 / 10.0 - 2.0,
            1 => ((i * 17) % 11) as f64 / 11.0 - 0.5,
            _ => ((i * 5) % 7) as f64 / 7.0 - 0.5,
        })
    }

    #[test]
    fn test_regression_roster_order() {
        let x = dataset();
        let y = x.column(0).mapv(|v| 1800.0 + 120.0 * v) + &x.column(1);
        let models = train_regression_models(&x, &y, &options()).unwrap();
        assert_eq!(
            models.names(),
            vec!["linear_regression", "ridge", "lasso", "random_forest", "gradient_boosting"]
        );
        assert_eq!(models.task, Task::Regression);
    }

    #[test]
    fn test_classification_roster_order() {
        let x = dataset();
        let y = x.column(0).mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let models = train_classification_models(&x, &y, &options()).unwrap();
        assert_eq!(
            models.names(),
            vec!["logistic_regression", "random_forest", "gradient_boosting", "svm", "naive_bayes"]
        );
        assert!(models.iter().all(|m| m.estimator.as_probabilistic().is_some()));

        let logistic = models.iter().find(|m| m.kind == ModelKind::LogisticRegression).unwrap();
        let report = logistic.estimator.training_report().unwrap();
        assert_eq!(report.samples, 40);
        assert_eq!(report.wins_in_data + report.losses_in_data, 40);
        assert!(report.accuracy > 0.9);
        assert_eq!(models.iter().filter(|m| m.estimator.training_report().is_some()).count(), 1);
    }

    #[test]
    fn test_first_failure_aborts() {
        let x = dataset();
        let y = Array1::zeros(40);
        let result = train_classification_models(&x, &y, &options());
        match result {
            Err(PipelineError::ModelFit { model, .. }) => assert_eq!(model, "logistic_regression"),
            other => panic!("expected a fit error, got {:?}", other.map(|m| m.names())),
        }
    }
}
