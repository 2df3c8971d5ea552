use tracing::{info, warn};

use crate::data::{EventTable, MatchTable};
use crate::error::Result;

/// Which team tags to count and where to put the results.
#[derive(Debug, Clone)]
pub struct CountSpec {
    pub blue_tag: String,
    pub red_tag: String,
    pub blue_column: String,
    pub red_column: String,
    pub diff_column: String,
}

impl CountSpec {
    pub fn new(blue_tag: &str, red_tag: &str, stem: &str, diff_column: &str) -> Self {
        Self {
            blue_tag: blue_tag.to_string(),
            red_tag: red_tag.to_string(),
            blue_column: format!("blue_{}", stem),
            red_column: format!("red_{}", stem),
            diff_column: diff_column.to_string(),
        }
    }
}

/// Gold checkpoints to extract: `(event field, output column)` pairs.
#[derive(Debug, Clone)]
pub struct GoldSpec {
    pub kind: String,
    pub checkpoints: Vec<(String, String)>,
}

impl Default for GoldSpec {
    fn default() -> Self {
        Self {
            kind: "golddiff".to_string(),
            checkpoints: [10, 15, 20]
                .iter()
                .map(|m| (format!("min_{}", m), format!("gold_diff_{}", m)))
                .collect(),
        }
    }
}

/// Left-join per-team event counts onto `matches`.
///
/// Matches without events get zero counts; the diff column is blue minus red.
pub fn aggregate_event_counts(matches: &MatchTable, events: &EventTable, tags: &CountSpec) -> Result<MatchTable> {
    let blue_counts = events.count_by_address(&tags.blue_tag);
    let red_counts = events.count_by_address(&tags.red_tag);

    let count_for = |counts: &std::collections::HashMap<String, usize>| -> Vec<f64> {
        matches
            .keys()
            .iter()
            .map(|k| counts.get(k).copied().unwrap_or(0) as f64)
            .collect()
    };
    let blue = count_for(&blue_counts);
    let red = count_for(&red_counts);
    let diff = blue.iter().zip(&red).map(|(b, r)| b - r).collect();

    matches
        .with_dense_column(&tags.blue_column, blue)?
        .with_dense_column(&tags.red_column, red)?
        .with_dense_column(&tags.diff_column, diff)
}

pub fn aggregate_kills(matches: &MatchTable, kills: &EventTable) -> Result<MatchTable> {
    info!("Aggregating kill features...");
    let table = aggregate_event_counts(matches, kills, &CountSpec::new("bKills", "rKills", "kills", "kill_diff"))?;
    info!("Kill features added: blue_kills, red_kills, kill_diff");
    Ok(table)
}

pub fn aggregate_monsters(features: &MatchTable, monsters: &EventTable) -> Result<MatchTable> {
    info!("Aggregating objective features (dragons/barons)...");
    let table = aggregate_event_counts(
        features,
        monsters,
        &CountSpec::new("bDragons", "rDragons", "dragons", "dragon_diff"),
    )?;
    let table = aggregate_event_counts(&table, monsters, &CountSpec::new("bBarons", "rBarons", "barons", "baron_diff"))?;
    info!("Objective features added");
    Ok(table)
}

pub fn aggregate_structures(features: &MatchTable, structures: &EventTable) -> Result<MatchTable> {
    info!("Aggregating structure features (towers/inhibitors)...");
    let table = aggregate_event_counts(
        features,
        structures,
        &CountSpec::new("bTowers", "rTowers", "towers", "tower_diff"),
    )?;
    let table = aggregate_event_counts(
        &table,
        structures,
        &CountSpec::new("bInhibs", "rInhibs", "inhibs", "inhib_diff"),
    )?;
    info!("Structure features added");
    Ok(table)
}

/// Attach gold-difference checkpoints, imputing gaps with the column median.
pub fn aggregate_gold(features: &MatchTable, gold: &EventTable, checkpoints: &GoldSpec) -> Result<MatchTable> {
    info!("Aggregating gold difference features...");
    let first_rows = gold.first_of_kind(&checkpoints.kind);
    let mut table = features.clone();

    for (field, column) in &checkpoints.checkpoints {
        let observed: Vec<Option<f64>> = features
            .keys()
            .iter()
            .map(|k| first_rows.get(k.as_str()).and_then(|row| row.values.get(field).copied()))
            .collect();

        let fill = match median(observed.iter().flatten().copied().collect()) {
            Some(m) => m,
            None => {
                warn!("No '{}' values observed for {}, filling with 0", field, column);
                0.0
            }
        };
        let missing = observed.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            info!("Imputed {} missing {} values with median {:.1}", missing, column, fill);
        }

        let values = observed.into_iter().map(|v| v.unwrap_or(fill)).collect();
        table = table.with_dense_column(column, values)?;
    }

    info!("Gold features added");
    Ok(table)
}

/// Median with the midpoint of the two central values for even lengths.
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EventRow;
    use std::collections::BTreeMap;

    fn matches(keys: &[&str]) -> MatchTable {
        MatchTable::new(keys.iter().map(|k| k.to_string()).collect()).unwrap()
    }

    fn team_event(address: &str, team: &str) -> EventRow {
        EventRow {
            address: address.to_string(),
            team: Some(team.to_string()),
            kind: None,
            values: BTreeMap::new(),
        }
    }

    fn gold_event(address: &str, kind: &str, values: &[(&str, f64)]) -> EventRow {
        EventRow {
            address: address.to_string(),
            team: None,
            kind: Some(kind.to_string()),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_kill_counts_and_diff() {
        let kills = EventTable::new(vec![
            team_event("m1", "bKills"),
            team_event("m1", "bKills"),
            team_event("m1", "bKills"),
            team_event("m1", "rKills"),
            team_event("m2", "rKills"),
            team_event("ghost", "bKills"),
        ]);
        let table = aggregate_kills(&matches(&["m1", "m2", "m3"]), &kills).unwrap();

        assert_eq!(table.keys(), &["m1", "m2", "m3"]);
        assert_eq!(table.dense_column("blue_kills").unwrap(), vec![3.0, 0.0, 0.0]);
        assert_eq!(table.dense_column("red_kills").unwrap(), vec![1.0, 1.0, 0.0]);
        assert_eq!(table.dense_column("kill_diff").unwrap(), vec![2.0, -1.0, 0.0]);
    }

    #[test]
    fn test_absent_tags_are_zero_filled() {
        let monsters = EventTable::new(vec![team_event("m1", "bDragons")]);
        let table = aggregate_monsters(&matches(&["m1", "m2"]), &monsters).unwrap();

        assert_eq!(table.dense_column("dragon_diff").unwrap(), vec![1.0, 0.0]);
        assert_eq!(table.dense_column("blue_barons").unwrap(), vec![0.0, 0.0]);
        assert_eq!(table.dense_column("baron_diff").unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_structures_columns() {
        let structures = EventTable::new(vec![
            team_event("m1", "rTowers"),
            team_event("m1", "rTowers"),
            team_event("m1", "bInhibs"),
        ]);
        let table = aggregate_structures(&matches(&["m1"]), &structures).unwrap();
        assert_eq!(table.dense_column("tower_diff").unwrap(), vec![-2.0]);
        assert_eq!(table.dense_column("inhib_diff").unwrap(), vec![1.0]);
    }

    #[test]
    fn test_input_table_is_not_mutated() {
        let base = matches(&["m1"]);
        let _ = aggregate_kills(&base, &EventTable::default()).unwrap();
        assert!(base.column_names().is_empty());
    }

    #[test]
    fn test_gold_median_imputation() {
        let gold = EventTable::new(vec![
            gold_event("m1", "goldblue", &[("min_10", 15000.0)]),
            gold_event("m1", "golddiff", &[("min_10", 100.0), ("min_15", 10.0), ("min_20", 1.0)]),
            gold_event("m1", "golddiff", &[("min_10", 5000.0)]),
            gold_event("m2", "golddiff", &[("min_10", 300.0), ("min_15", 30.0), ("min_20", 3.0)]),
            gold_event("m3", "golddiff", &[("min_10", -200.0), ("min_15", 20.0)]),
        ]);
        let table = aggregate_gold(&matches(&["m1", "m2", "m3", "m4"]), &gold, &GoldSpec::default()).unwrap();

        assert_eq!(table.dense_column("gold_diff_10").unwrap(), vec![100.0, 300.0, -200.0, 100.0]);
        assert_eq!(table.dense_column("gold_diff_15").unwrap(), vec![10.0, 30.0, 20.0, 20.0]);
        assert_eq!(table.dense_column("gold_diff_20").unwrap(), vec![1.0, 3.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gold_without_observations_fills_zero() {
        let table = aggregate_gold(&matches(&["m1", "m2"]), &EventTable::default(), &GoldSpec::default()).unwrap();
        assert_eq!(table.dense_column("gold_diff_20").unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![]), None);
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }
}
