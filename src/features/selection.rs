use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ModelOptions;
use crate::data::MatchTable;
use crate::error::{PipelineError, Result};

/// Feature matrix with its column names, rows in match order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if feature_names.len() != values.ncols() {
            return Err(PipelineError::shape(
                format!("{} feature columns", feature_names.len()),
                format!("{} matrix columns", values.ncols()),
            ));
        }
        Ok(Self { feature_names, values })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }
}

/// Selected features plus the duration and outcome targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    pub features: FeatureMatrix,
    pub regression_target: Array1<f64>,
    pub classification_target: Array1<f64>,
}

/// Disjoint train/test row indices, both in permutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub x_train: FeatureMatrix,
    pub x_test: FeatureMatrix,
    pub y_reg_train: Array1<f64>,
    pub y_reg_test: Array1<f64>,
    pub y_cls_train: Array1<f64>,
    pub y_cls_test: Array1<f64>,
}

pub fn select_features(table: &MatchTable, options: &ModelOptions) -> Result<ModelInput> {
    info!("Selecting model features...");

    // Resolve every name first so the error lists all of them at once
    let missing: Vec<&str> = options
        .feature_columns
        .iter()
        .chain(options.target_columns.iter())
        .map(String::as_str)
        .filter(|name| !table.has_column(name))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "columns not found in feature table: {}",
            missing.join(", ")
        )));
    }

    let n = table.len();
    let mut values = Array2::<f64>::zeros((n, options.feature_columns.len()));
    for (j, name) in options.feature_columns.iter().enumerate() {
        let column = table.dense_column(name)?;
        values.column_mut(j).assign(&Array1::from(column));
    }

    let regression_target = Array1::from(table.dense_column(options.regression_target())?);
    let classification_target = Array1::from(table.dense_column(options.classification_target())?);
    if let Some(bad) = classification_target.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(PipelineError::Data(format!(
            "classification target '{}' must be 0/1, found {}",
            options.classification_target(),
            bad
        )));
    }

    let features = FeatureMatrix::new(options.feature_columns.clone(), values)?;
    info!("Selected {} features", features.ncols());
    info!("Model input shape: ({}, {})", n, features.ncols() + options.target_columns.len());

    Ok(ModelInput {
        features,
        regression_target,
        classification_target,
    })
}

/// Seeded shuffle split: the first `ceil(test_size * n)` permuted rows form
/// the test partition.
pub fn split_indices(n_rows: usize, test_size: f64, seed: u64) -> Result<SplitIndices> {
    // 1e-9 keeps e.g. 0.2 * 100 from rounding up to 21
    let n_test = ((test_size * n_rows as f64) - 1e-9).ceil().max(0.0) as usize;
    let n_train = n_rows.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(PipelineError::shape(
            "at least one train and one test row",
            format!("{} train / {} test from {} rows", n_train, n_test, n_rows),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut permutation: Vec<usize> = (0..n_rows).collect();
    permutation.shuffle(&mut rng);

    let train = permutation.split_off(n_test);
    Ok(SplitIndices { train, test: permutation })
}

/// Apply a single partition to the features and both targets.
pub fn split_data(input: &ModelInput, options: &ModelOptions) -> Result<DataSplit> {
    info!("Splitting data into train/test...");
    let n = input.features.nrows();
    for (name, len) in [
        ("regression target", input.regression_target.len()),
        ("classification target", input.classification_target.len()),
    ] {
        if len != n {
            return Err(PipelineError::shape(
                format!("{} rows in {}", n, name),
                len.to_string(),
            ));
        }
    }

    let indices = split_indices(n, options.test_size, options.random_state)?;
    let split = DataSplit {
        x_train: input.features.take_rows(&indices.train),
        x_test: input.features.take_rows(&indices.test),
        y_reg_train: input.regression_target.select(Axis(0), &indices.train),
        y_reg_test: input.regression_target.select(Axis(0), &indices.test),
        y_cls_train: input.classification_target.select(Axis(0), &indices.train),
        y_cls_test: input.classification_target.select(Axis(0), &indices.test),
    };

    info!(
        "Train set: {} samples ({:.1}%)",
        indices.train.len(),
        indices.train.len() as f64 / n as f64 * 100.0
    );
    info!(
        "Test set: {} samples ({:.1}%)",
        indices.test.len(),
        indices.test.len() as f64 / n as f64 * 100.0
    );
    Ok(split)
}
