pub mod boosting;
pub mod forest;
pub mod linalg;
pub mod linear;
pub mod logistic;
pub mod model;
pub mod naive_bayes;
pub mod predictor;
pub mod svm;
pub mod trainer;
pub mod tree;

pub use model::{Estimator, ModelSet, Task};
pub use predictor::{predict_classification, predict_regression, PredictionSet};
pub use trainer::{train_classification_models, train_regression_models};
