use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{Estimator, ModelSet, Task};
use crate::error::{PipelineError, Result};

/// Predictions of one model on both partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPredictions {
    pub model: String,
    pub train: Array1<f64>,
    pub test: Array1<f64>,
    /// Positive-class probabilities, classifiers only
    pub train_proba: Option<Array1<f64>>,
    pub test_proba: Option<Array1<f64>>,
}

/// Predictions of every model of a task, in roster order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSet {
    pub task: Task,
    pub models: Vec<ModelPredictions>,
}

impl PredictionSet {
    #[cfg(test)]
    pub fn get(&self, model: &str) -> Option<&ModelPredictions> {
        self.models.iter().find(|p| p.model == model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}

pub fn predict_regression(models: &ModelSet, x_train: &Array2<f64>, x_test: &Array2<f64>) -> Result<PredictionSet> {
    let mut predictions = Vec::with_capacity(models.len());
    for model in models.iter() {
        predictions.push(ModelPredictions {
            model: model.name().to_string(),
            train: model.estimator.predict(x_train)?,
            test: model.estimator.predict(x_test)?,
            train_proba: None,
            test_proba: None,
        });
        debug!("{}: predicted {} train / {} test rows", model.name(), x_train.nrows(), x_test.nrows());
    }
    Ok(PredictionSet {
        task: Task::Regression,
        models: predictions,
    })
}

pub fn predict_classification(
    models: &ModelSet,
    x_train: &Array2<f64>,
    x_test: &Array2<f64>,
) -> Result<PredictionSet> {
    let mut predictions = Vec::with_capacity(models.len());
    for model in models.iter() {
        let proba = model
            .estimator
            .as_probabilistic()
            .ok_or_else(|| PipelineError::model_fit(model.name(), "classifier does not provide probabilities"))?;
        predictions.push(ModelPredictions {
            model: model.name().to_string(),
            train: model.estimator.predict(x_train)?,
            test: model.estimator.predict(x_test)?,
            train_proba: Some(proba.predict_proba(x_train)?),
            test_proba: Some(proba.predict_proba(x_test)?),
        });
        debug!("{}: predicted {} train / {} test rows", model.name(), x_train.nrows(), x_test.nrows());
    }
    Ok(PredictionSet {
        task: Task::Classification,
        models: predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::linear::LinearRegression;
    use crate::ml::model::{ModelEstimator, ModelKind, TrainedModel};
    use crate::ml::naive_bayes::GaussianNaiveBayes;
    use ndarray::array;

    #[test]
    fn test_regression_predictions_have_no_probabilities() {
        let x = array![[0.0], [1.0], [2.0]];
        let mut estimator = ModelEstimator::Linear(LinearRegression::ordinary());
        estimator.fit(&x, &array![1.0, 3.0, 5.0]).unwrap();
        let mut models = ModelSet::new(Task::Regression);
        models
            .push(TrainedModel {
                task: Task::Regression,
                kind: ModelKind::LinearRegression,
                estimator,
            })
            .unwrap();

        let predictions = predict_regression(&models, &x, &array![[3.0]]).unwrap();
        let p = predictions.get("linear_regression").unwrap();
        assert!((p.test[0] - 7.0).abs() < 1e-9);
        assert_eq!(p.train.len(), 3);
        assert!(p.train_proba.is_none());
    }

    #[test]
    fn test_classification_predictions_include_probabilities() {
        let x = array![[0.0], [0.2], [1.0], [1.2]];
        let mut estimator = ModelEstimator::NaiveBayes(GaussianNaiveBayes::new());
        estimator.fit(&x, &array![0.0, 0.0, 1.0, 1.0]).unwrap();
        let mut models = ModelSet::new(Task::Classification);
        models
            .push(TrainedModel {
                task: Task::Classification,
                kind: ModelKind::NaiveBayes,
                estimator,
            })
            .unwrap();

        let predictions = predict_classification(&models, &x, &array![[1.1]]).unwrap();
        let p = predictions.get("naive_bayes").unwrap();
        assert_eq!(p.test, array![1.0]);
        assert!(p.test_proba.as_ref().unwrap()[0] > 0.5);
        assert_eq!(p.train_proba.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn test_regressor_in_classification_set_is_rejected() {
        let x = array![[0.0], [1.0]];
        let mut estimator = ModelEstimator::Linear(LinearRegression::ordinary());
        estimator.fit(&x, &array![0.0, 1.0]).unwrap();
        let mut models = ModelSet::new(Task::Classification);
        models
            .push(TrainedModel {
                task: Task::Classification,
                kind: ModelKind::LinearRegression,
                estimator,
            })
            .unwrap();

        let result = predict_classification(&models, &x, &x);
        assert!(matches!(result, Err(PipelineError::ModelFit { .. })));
    }
}
