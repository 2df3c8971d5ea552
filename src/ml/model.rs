use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::boosting::GradientBoosting;
use super::forest::RandomForest;
use super::linear::{LassoRegression, LinearRegression};
use super::logistic::{LogisticRegression, TrainingReport};
use super::naive_bayes::GaussianNaiveBayes;
use super::svm::SupportVectorClassifier;
use crate::error::{PipelineError, Result};

/// A model that can be fitted and queried for point predictions.
///
/// Optional capabilities are discovered at runtime instead of assumed:
/// tree ensembles expose importances, classifiers expose probabilities.
pub trait Estimator: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Regression values, or 0/1 labels for classifiers
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Normalised impurity-based importances, one per feature
    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        None
    }
}

pub trait ProbabilisticClassifier {
    /// Probability of the positive class (label 1) per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    Classification,
}

impl Task {
    pub fn as_str(&self) -> &str {
        match self {
            Task::Regression => "regression",
            Task::Classification => "classification",
        }
    }
}

impl FromStr for Task {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regression" => Ok(Task::Regression),
            "classification" => Ok(Task::Classification),
            _ => Err(PipelineError::Configuration(format!("Unknown task: {}", s))),
        }
    }
}

/// Model identifier, shared across tasks where the family is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    Ridge,
    Lasso,
    RandomForest,
    GradientBoosting,
    LogisticRegression,
    Svm,
    NaiveBayes,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::Ridge => "ridge",
            ModelKind::Lasso => "lasso",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::Svm => "svm",
            ModelKind::NaiveBayes => "naive_bayes",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear_regression" => Ok(ModelKind::LinearRegression),
            "ridge" => Ok(ModelKind::Ridge),
            "lasso" => Ok(ModelKind::Lasso),
            "random_forest" => Ok(ModelKind::RandomForest),
            "gradient_boosting" => Ok(ModelKind::GradientBoosting),
            "logistic_regression" => Ok(ModelKind::LogisticRegression),
            "svm" => Ok(ModelKind::Svm),
            "naive_bayes" => Ok(ModelKind::NaiveBayes),
            _ => Err(PipelineError::Configuration(format!("Unknown model kind: {}", s))),
        }
    }
}

/// Closed set of fitted estimators, serialisable into the artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelEstimator {
    Linear(LinearRegression),
    Lasso(LassoRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Logistic(LogisticRegression),
    Svm(SupportVectorClassifier),
    NaiveBayes(GaussianNaiveBayes),
}

impl ModelEstimator {
    fn inner(&self) -> &dyn Estimator {
        match self {
            ModelEstimator::Linear(m) => m,
            ModelEstimator::Lasso(m) => m,
            ModelEstimator::RandomForest(m) => m,
            ModelEstimator::GradientBoosting(m) => m,
            ModelEstimator::Logistic(m) => m,
            ModelEstimator::Svm(m) => m,
            ModelEstimator::NaiveBayes(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Estimator {
        match self {
            ModelEstimator::Linear(m) => m,
            ModelEstimator::Lasso(m) => m,
            ModelEstimator::RandomForest(m) => m,
            ModelEstimator::GradientBoosting(m) => m,
            ModelEstimator::Logistic(m) => m,
            ModelEstimator::Svm(m) => m,
            ModelEstimator::NaiveBayes(m) => m,
        }
    }

    /// Fit summary, for estimators that record one.
    pub fn training_report(&self) -> Option<&TrainingReport> {
        match self {
            ModelEstimator::Logistic(m) => m.report(),
            _ => None,
        }
    }
}

impl Estimator for ModelEstimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.inner().feature_importances()
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        self.inner().as_probabilistic()
    }
}

/// A fitted model together with what it was trained for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub task: Task,
    pub kind: ModelKind,
    pub estimator: ModelEstimator,
}

impl TrainedModel {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Trained models of one task, in roster order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSet {
    pub task: Task,
    models: Vec<TrainedModel>,
}

impl ModelSet {
    pub fn new(task: Task) -> Self {
        Self { task, models: Vec::new() }
    }

    pub fn push(&mut self, model: TrainedModel) -> Result<()> {
        if model.task != self.task {
            return Err(PipelineError::Configuration(format!(
                "cannot add {} model '{}' to a {} model set",
                model.task.as_str(),
                model.name(),
                self.task.as_str()
            )));
        }
        if self.get(model.name()).is_some() {
            return Err(PipelineError::Configuration(format!("model '{}' trained twice", model.name())));
        }
        self.models.push(model);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TrainedModel> {
        self.models.iter().find(|m| m.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainedModel> {
        self.models.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.models.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}

/// Shared entry checks for every `fit`.
pub(crate) fn check_training_data(model: &str, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::shape(
            format!("{} target values", x.nrows()),
            y.len().to_string(),
        ));
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::model_fit(model, "empty training matrix"));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(PipelineError::model_fit(model, "training data contains non-finite values"));
    }
    Ok(())
}

/// Classifier targets must be 0/1 with both classes present.
pub(crate) fn check_binary_labels(model: &str, y: &Array1<f64>) -> Result<()> {
    if y.iter().any(|v| *v != 0.0 && *v != 1.0) {
        return Err(PipelineError::model_fit(model, "labels must be 0 or 1"));
    }
    let positives = y.iter().filter(|v| **v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(PipelineError::model_fit(model, "training target contains a single class"));
    }
    Ok(())
}

pub(crate) fn check_prediction_input(model: &str, x: &Array2<f64>, n_features: usize) -> Result<()> {
    if n_features == 0 {
        return Err(PipelineError::model_fit(model, "model used before fit"));
    }
    if x.ncols() != n_features {
        return Err(PipelineError::shape(
            format!("{} features", n_features),
            format!("{} features", x.ncols()),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_finite<'a>(model: &str, values: impl IntoIterator<Item = &'a f64>) -> Result<()> {
    if values.into_iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::model_fit(model, "fitted parameters are not finite"));
    }
    Ok(())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_model_kind_from_str() {
        assert_eq!(ModelKind::from_str("svm").unwrap(), ModelKind::Svm);
        assert_eq!(ModelKind::from_str("random_forest").unwrap(), ModelKind::RandomForest);
        assert!(ModelKind::from_str("xgboost").is_err());
        assert_eq!(ModelKind::NaiveBayes.to_string(), "naive_bayes");
    }

    #[test]
    fn test_model_set_rejects_duplicates_and_wrong_task() {
        let mut set = ModelSet::new(Task::Regression);
        let model = TrainedModel {
            task: Task::Regression,
            kind: ModelKind::Ridge,
            estimator: ModelEstimator::Linear(LinearRegression::ridge(1.0)),
        };
        set.push(model.clone()).unwrap();
        assert!(set.push(model).is_err());

        let wrong = TrainedModel {
            task: Task::Classification,
            kind: ModelKind::NaiveBayes,
            estimator: ModelEstimator::NaiveBayes(GaussianNaiveBayes::new()),
        };
        assert!(set.push(wrong).is_err());
        assert_eq!(set.names(), vec!["ridge"]);
    }

    #[test]
    fn test_training_checks() {
        let x = array![[1.0, 2.0], [3.0, f64::NAN]];
        let y = array![0.0, 1.0];
        assert!(matches!(check_training_data("m", &x, &y), Err(PipelineError::ModelFit { .. })));
        assert!(matches!(
            check_training_data("m", &array![[1.0]], &y),
            Err(PipelineError::DataShape { .. })
        ));
        assert!(check_binary_labels("m", &array![1.0, 1.0]).is_err());
        assert!(check_binary_labels("m", &array![1.0, 0.5]).is_err());
        assert!(check_binary_labels("m", &array![1.0, 0.0]).is_ok());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
    }
}
