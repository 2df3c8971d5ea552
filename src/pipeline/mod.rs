pub mod registry;
pub mod runner;
pub mod stage;

pub use registry::{find_pipeline, registry, DEFAULT_PIPELINE};
pub use runner::{plan, run_pipeline};
pub use stage::names;

#[cfg(test)]
mod tests {
    use super::stage::Stage;
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::MatchTable;
    use crate::evaluation::{ClassificationReport, RegressionReport};
    use crate::store::{ArtifactStore, MemoryStore, StoreExt};
    use std::fmt::Write as _;
    use std::fs;
    use std::path::Path;

    const MATCHES: usize = 100;
    /// Match left out of the gold export, imputed with the median
    const NO_GOLD: usize = 99;

    fn gold_at_20(i: usize) -> f64 {
        ((i * 37) % 100) as f64 * 100.0 - 4950.0
    }

    /// Synthetic exports: game length is linear in the kill counts and the
    /// blue side wins exactly when it leads in gold at 20 minutes.
    fn write_exports(dir: &Path) -> PipelineConfig {
        let mut matchinfo = String::from("League,Address,bResult,gamelength\n");
        let mut kills = String::from("Address,Team,Time\n");
        let mut monsters = String::from("Address,Team,Time,Type\n");
        let mut structures = String::from("Address,Team,Time,Lane\n");
        let mut gold = String::from("Address,Type,min_10,min_15,min_20\n");

        for i in 0..MATCHES {
            let address = format!("https://matchhistory.example/{}", i);
            let (blue_kills, red_kills) = ((i * 7) % 15 + 3, (i * 11) % 13 + 2);
            let won = if i == NO_GOLD { false } else { gold_at_20(i) > 0.0 };
            let gamelength = 20 + blue_kills + red_kills;
            writeln!(matchinfo, "NALCS,{},{},{}", address, won as u8, gamelength).unwrap();

            for k in 0..blue_kills {
                writeln!(kills, "{},bKills,{}.5", address, k).unwrap();
            }
            for k in 0..red_kills {
                writeln!(kills, "{},rKills,{}.5", address, k).unwrap();
            }
            for (tag, count) in [("bDragons", i % 4), ("rDragons", (i / 4) % 3), ("bBarons", i % 2), ("rBarons", (i % 3 == 0) as usize)] {
                for t in 0..count {
                    writeln!(monsters, "{},{},{},\"FIRE, WATER\"", address, tag, 10 + t).unwrap();
                }
            }
            for (tag, count) in [("bTowers", i % 9), ("rTowers", (i * 5) % 8), ("bInhibs", i % 3), ("rInhibs", i % 2)] {
                for t in 0..count {
                    writeln!(structures, "{},{},{},MID_LANE", address, tag, 15 + t).unwrap();
                }
            }
            if i != NO_GOLD {
                let g20 = gold_at_20(i);
                writeln!(gold, "{},golddiff,{},{},{}", address, g20 / 4.0, g20 / 2.0, g20).unwrap();
                writeln!(gold, "{},goldblue,1000,2000,3000", address).unwrap();
            }
        }
        // an unattributed row from the raw export
        writeln!(kills, ",bKills,3.0").unwrap();

        let mut config = PipelineConfig::default();
        for (name, text) in [
            ("matchinfo.csv", &matchinfo),
            ("kills.csv", &kills),
            ("monsters.csv", &monsters),
            ("structures.csv", &structures),
            ("gold.csv", &gold),
        ] {
            fs::write(dir.join(name), text).unwrap();
        }
        config.data.matchinfo_path = dir.join("matchinfo.csv");
        config.data.kills_path = dir.join("kills.csv");
        config.data.monsters_path = dir.join("monsters.csv");
        config.data.structures_path = dir.join("structures.csv");
        config.data.gold_path = dir.join("gold.csv");
        config.report.output_dir = dir.join("reporting");
        config.model_options.regression_models.rf_n_estimators = 30;
        config.model_options.classification_models.rf_n_estimators = 30;
        config
    }

    #[test]
    fn test_end_to_end_on_synthetic_matches() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_exports(dir.path());
        let mut store = MemoryStore::new();

        let pipeline = find_pipeline(DEFAULT_PIPELINE).unwrap();
        let summary = run_pipeline(&pipeline, &config, &mut store).unwrap();
        assert_eq!(summary.stages.len(), Stage::ALL.len());
        assert_eq!(summary.pipeline, DEFAULT_PIPELINE);

        // every match survives aggregation, in input order
        let features: MatchTable = store.load(names::FEATURES_COMPLETE).unwrap();
        assert_eq!(features.len(), MATCHES);
        let kill_diff = features.dense_column("kill_diff").unwrap();
        assert_eq!(kill_diff[1], 10.0 - 13.0);
        let gold_20 = features.dense_column("gold_diff_20").unwrap();
        assert_eq!(gold_20[NO_GOLD], -50.0);

        let regression: RegressionReport = store.load(names::REGRESSION_REPORT).unwrap();
        assert!(regression.best_r2 > 0.9, "best R2 {}", regression.best_r2);
        assert_eq!(regression.all_metrics.len(), 5);
        assert_eq!(regression.run_id, summary.run_id);

        let classification: ClassificationReport = store.load(names::CLASSIFICATION_REPORT).unwrap();
        assert!(classification.best_f1 > 0.9, "best F1 {}", classification.best_f1);
        assert_eq!(classification.all_metrics.len(), 5);
        assert!(classification.top_features.is_some());

        let reporting = dir.path().join("reporting");
        for file in [
            "regression_report.json",
            "regression_metrics.csv",
            "classification_report.json",
            "classification_metrics.csv",
        ] {
            assert!(reporting.join(file).exists(), "{} missing", file);
        }
    }

    #[test]
    fn test_groups_share_artifacts_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_exports(dir.path());
        let mut store = MemoryStore::new();

        run_pipeline(&find_pipeline("ingest").unwrap(), &config, &mut store).unwrap();
        run_pipeline(&find_pipeline("dp").unwrap(), &config, &mut store).unwrap();
        assert!(store.contains(names::X_TRAIN_SCALED).unwrap());
        assert!(!store.contains(names::REGRESSION_MODELS).unwrap());

        let x_train: crate::features::FeatureMatrix = store.load(names::X_TRAIN).unwrap();
        let x_test: crate::features::FeatureMatrix = store.load(names::X_TEST).unwrap();
        assert_eq!(x_train.nrows(), 80);
        assert_eq!(x_test.nrows(), 20);
    }

    #[test]
    fn test_split_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_exports(dir.path());
        let ingest = find_pipeline("ingest").unwrap();
        let dp = find_pipeline("dp").unwrap();

        let mut first = MemoryStore::new();
        let mut second = MemoryStore::new();
        for store in [&mut first, &mut second] {
            run_pipeline(&ingest, &config, &mut *store).unwrap();
            run_pipeline(&dp, &config, &mut *store).unwrap();
        }
        let a: ndarray::Array1<f64> = first.load(names::Y_REG_TEST).unwrap();
        let b: ndarray::Array1<f64> = second.load(names::Y_REG_TEST).unwrap();
        assert_eq!(a, b);
    }
}
