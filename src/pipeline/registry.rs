use super::stage::Stage;
use crate::error::{PipelineError, Result};

pub const DEFAULT_PIPELINE: &str = "__default__";

/// A named, ordered group of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub stages: Vec<Stage>,
}

impl Pipeline {
    fn new(name: &'static str, aliases: &'static [&'static str], stages: &[Stage]) -> Self {
        Self {
            name,
            aliases,
            stages: stages.to_vec(),
        }
    }

    /// Concatenation of other pipelines, keeping their order.
    fn chain(name: &'static str, parts: &[&Pipeline]) -> Self {
        Self {
            name,
            aliases: &[],
            stages: parts.iter().flat_map(|p| p.stages.iter().copied()).collect(),
        }
    }
}

fn ingest() -> Pipeline {
    Pipeline::new("ingest", &[], &[Stage::IngestRawTables])
}

fn data_processing() -> Pipeline {
    Pipeline::new(
        "data_processing",
        &["dp"],
        &[
            Stage::AggregateKills,
            Stage::AggregateMonsters,
            Stage::AggregateStructures,
            Stage::AggregateGold,
            Stage::SelectFeatures,
            Stage::SplitData,
            Stage::ScaleFeatures,
        ],
    )
}

fn data_science() -> Pipeline {
    Pipeline::new(
        "data_science",
        &["ds"],
        &[
            Stage::TrainRegressionModels,
            Stage::MakeRegressionPredictions,
            Stage::TrainClassificationModels,
            Stage::MakeClassificationPredictions,
        ],
    )
}

fn evaluation() -> Pipeline {
    Pipeline::new(
        "evaluation",
        &["eval"],
        &[
            Stage::EvaluateRegression,
            Stage::RegressionFeatureImportance,
            Stage::CreateRegressionReport,
            Stage::EvaluateClassification,
            Stage::ClassificationFeatureImportance,
            Stage::CreateClassificationReport,
        ],
    )
}

/// Every registered pipeline with its aliases, in listing order.
pub fn registry() -> Vec<Pipeline> {
    let (ingest, dp, ds, eval) = (ingest(), data_processing(), data_science(), evaluation());
    let training = Pipeline::chain("training", &[&dp, &ds, &eval]);
    let default = Pipeline::chain(DEFAULT_PIPELINE, &[&ingest, &dp, &ds, &eval]);
    vec![ingest, dp, ds, eval, training, default]
}

/// Resolve a pipeline by name or alias.
pub fn find_pipeline(name: &str) -> Result<Pipeline> {
    let entries = registry();
    let known = entries.iter().map(|p| p.name).collect::<Vec<_>>().join(", ");

    entries
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .ok_or_else(|| PipelineError::Configuration(format!("Unknown pipeline '{}'. Known pipelines: {}", name, known)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_runs_every_stage_in_order() {
        let default = find_pipeline(DEFAULT_PIPELINE).unwrap();
        assert_eq!(default.stages, Stage::ALL.to_vec());
    }

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(find_pipeline("dp").unwrap().name, "data_processing");
        assert_eq!(find_pipeline("ds").unwrap().name, "data_science");
        assert_eq!(find_pipeline("eval").unwrap().name, "evaluation");
        assert_eq!(find_pipeline("training").unwrap().stages.len(), 17);
    }

    #[test]
    fn test_unknown_pipeline_lists_known_names() {
        match find_pipeline("deploy") {
            Err(PipelineError::Configuration(msg)) => {
                assert!(msg.contains("deploy"));
                assert!(msg.contains("data_science"));
                assert!(msg.contains("__default__"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_every_artifact_has_one_producer() {
        let mut producers: HashMap<&str, Vec<&str>> = HashMap::new();
        for stage in Stage::ALL {
            for output in stage.outputs() {
                producers.entry(*output).or_default().push(stage.name());
            }
        }
        for (artifact, stages) in &producers {
            assert_eq!(stages.len(), 1, "{} produced by {:?}", artifact, stages);
        }
    }

    #[test]
    fn test_inputs_are_produced_earlier() {
        let mut available: Vec<&str> = Vec::new();
        for stage in Stage::ALL {
            for input in stage.inputs() {
                assert!(available.contains(input), "{} needs {} before it exists", stage, input);
            }
            available.extend(stage.outputs());
        }
    }
}
