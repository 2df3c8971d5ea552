use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A single in-game event row (a kill, a dragon, a tower, a gold series...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub address: String,
    /// Team-side tag such as `bKills` or `rTowers`
    pub team: Option<String>,
    /// Row kind such as `golddiff`
    pub kind: Option<String>,
    /// Numeric fields of the row; unparsable or empty cells are absent
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    rows: Vec<EventRow>,
}

impl EventTable {
    pub fn new(rows: Vec<EventRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EventRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows carrying `team_tag`, grouped by match address.
    pub fn count_by_address(&self, team_tag: &str) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.team.as_deref() == Some(team_tag)) {
            *counts.entry(row.address.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// First row of `kind` per address, in table order.
    pub fn first_of_kind(&self, kind: &str) -> HashMap<&str, &EventRow> {
        let mut first: HashMap<&str, &EventRow> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.kind.as_deref() == Some(kind)) {
            first.entry(row.address.as_str()).or_insert(row);
        }
        first
    }
}
