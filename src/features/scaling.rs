use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::selection::FeatureMatrix;
use crate::config::ConstantColumnPolicy;
use crate::error::{PipelineError, Result};

/// Per-feature standardisation learned from the training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation, 1.0 for constant columns
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaledSplit {
    pub x_train: FeatureMatrix,
    pub x_test: FeatureMatrix,
}

impl StandardScaler {
    pub fn fit(x_train: &FeatureMatrix, policy: ConstantColumnPolicy) -> Result<Self> {
        let n = x_train.nrows();
        if n == 0 {
            return Err(PipelineError::shape("at least one training row", "0"));
        }

        let mut mean = Vec::with_capacity(x_train.ncols());
        let mut scale = Vec::with_capacity(x_train.ncols());
        for (j, column) in x_train.values.axis_iter(Axis(1)).enumerate() {
            let mu = column.sum() / n as f64;
            let var = column.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n as f64;
            let std = var.sqrt();
            let name = &x_train.feature_names[j];

            if std <= 1e-12 * mu.abs().max(1.0) {
                match policy {
                    ConstantColumnPolicy::Reject => {
                        return Err(PipelineError::NumericDegeneracy { feature: name.clone() })
                    }
                    ConstantColumnPolicy::UnitVariance => {
                        warn!("Feature '{}' is constant in the training split, using unit variance", name);
                        mean.push(mu);
                        scale.push(1.0);
                        continue;
                    }
                }
            }
            mean.push(mu);
            scale.push(std);
        }

        Ok(Self {
            feature_names: x_train.feature_names.clone(),
            mean,
            scale,
        })
    }

    pub fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        if x.ncols() != self.mean.len() {
            return Err(PipelineError::shape(
                format!("{} columns", self.mean.len()),
                format!("{} columns", x.ncols()),
            ));
        }
        let mut values: Array2<f64> = x.values.clone();
        for (j, mut column) in values.axis_iter_mut(Axis(1)).enumerate() {
            let (mu, sigma) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - mu) / sigma);
        }
        FeatureMatrix::new(x.feature_names.clone(), values)
    }
}

/// Fit on the training rows, then transform both partitions.
pub fn scale_features(
    x_train: &FeatureMatrix,
    x_test: &FeatureMatrix,
    policy: ConstantColumnPolicy,
) -> Result<(ScaledSplit, StandardScaler)> {
    info!("Standardising features...");
    let scaler = StandardScaler::fit(x_train, policy)?;
    let x_train = scaler.transform(x_train)?;
    let x_test = scaler.transform(x_test)?;

    let means = x_train.values.mean_axis(Axis(0));
    let stds = x_train.values.std_axis(Axis(0), 0.0);
    if let Some(means) = means {
        info!("Standardisation complete");
        info!("   Mean after: {:.6}", means.mean().unwrap_or(0.0));
        info!("   Std after: {:.6}", stds.mean().unwrap_or(0.0));
    }

    Ok((ScaledSplit { x_train, x_test }, scaler))
}
