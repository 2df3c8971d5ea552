use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span};
use uuid::Uuid;

use super::registry::Pipeline;
use super::stage::{Stage, StageContext};
use crate::config::{PipelineConfig, SchedulerSettings};
use crate::error::{PipelineError, Result};
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: &'static str,
    pub stages: Vec<StageTiming>,
    pub elapsed: Duration,
}

/// Run every stage of `pipeline` in order. The first failing stage aborts
/// the run; nothing after it executes.
pub fn run_pipeline(pipeline: &Pipeline, config: &PipelineConfig, store: &mut dyn ArtifactStore) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    info!("Running pipeline '{}' ({} stages, run {})", pipeline.name, pipeline.stages.len(), run_id);

    let mut timings = Vec::with_capacity(pipeline.stages.len());
    for stage in &pipeline.stages {
        let span = info_span!("stage", name = stage.name());
        let _enter = span.enter();

        match run_stage(*stage, config, &mut *store, run_id) {
            Ok(elapsed) => timings.push(StageTiming { stage: *stage, elapsed }),
            Err(e) => {
                error!("Stage {} failed: {}", stage, e);
                return Err(e);
            }
        }
    }

    let elapsed = started.elapsed();
    info!("Pipeline '{}' finished in {:.2?}", pipeline.name, elapsed);
    Ok(RunSummary {
        run_id,
        pipeline: pipeline.name,
        stages: timings,
        elapsed,
    })
}

fn run_stage(stage: Stage, config: &PipelineConfig, store: &mut dyn ArtifactStore, run_id: Uuid) -> Result<Duration> {
    for input in stage.inputs() {
        if !store.contains(input)? {
            return Err(PipelineError::MissingArtifact(input.to_string()));
        }
    }

    info!("Starting stage {}", stage);
    let started = Instant::now();
    let mut ctx = StageContext { config, store: &mut *store, run_id };
    stage.run(&mut ctx)?;

    for output in stage.outputs() {
        if !store.contains(output)? {
            return Err(PipelineError::Store(format!("stage {} did not produce '{}'", stage, output)));
        }
    }
    let elapsed = started.elapsed();
    info!("Finished stage {} in {:.2?}", stage, elapsed);
    Ok(elapsed)
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
    pub name: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

/// Description of a pipeline for an external scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub pipeline: &'static str,
    pub stages: Vec<PlannedStage>,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub schedule: String,
}

pub fn plan(pipeline: &Pipeline, scheduler: &SchedulerSettings) -> RunPlan {
    RunPlan {
        pipeline: pipeline.name,
        stages: pipeline
            .stages
            .iter()
            .map(|s| PlannedStage {
                name: s.name(),
                inputs: s.inputs(),
                outputs: s.outputs(),
            })
            .collect(),
        retries: scheduler.retries,
        retry_delay_secs: scheduler.retry_delay_secs,
        schedule: scheduler.schedule.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::registry::find_pipeline;
    use crate::store::{MemoryStore, MockArtifactStore};

    #[test]
    fn test_missing_input_stops_before_running() {
        let mut store = MockArtifactStore::new();
        store.expect_contains().returning(|_| Ok(false));
        store.expect_get().never();
        store.expect_put().never();

        let pipeline = find_pipeline("dp").unwrap();
        let result = run_pipeline(&pipeline, &PipelineConfig::default(), &mut store);
        assert!(matches!(result, Err(PipelineError::MissingArtifact(name)) if name == "matchinfo"));
    }

    #[test]
    fn test_failing_stage_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.data.matchinfo_path = dir.path().join("missing.csv");

        let mut store = MemoryStore::new();
        let pipeline = find_pipeline("__default__").unwrap();
        assert!(matches!(
            run_pipeline(&pipeline, &config, &mut store),
            Err(PipelineError::Io(_))
        ));
        assert!(store.names().unwrap().is_empty());
    }

    #[test]
    fn test_plan_lists_stages_and_scheduler() {
        let pipeline = find_pipeline("eval").unwrap();
        let plan = plan(&pipeline, &SchedulerSettings::default());
        assert_eq!(plan.pipeline, "evaluation");
        assert_eq!(plan.stages.len(), 6);
        assert_eq!(plan.stages[0].name, "evaluate_regression");
        assert_eq!(plan.retries, 1);
        assert_eq!(plan.retry_delay_secs, 300);

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["stages"][2]["outputs"][0], "regression_report");
    }
}
