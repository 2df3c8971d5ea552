//! CART decision tree used as the base learner of the ensembles.

use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Impurity criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Variance of the target (regression, boosting residuals)
    Mse,
    /// Gini impurity of 0/1 labels
    Gini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Running sums of a set of targets; enough to compute either criterion.
#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    count: f64,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn add(&mut self, y: f64) {
        self.count += 1.0;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn minus(&self, other: &Stats) -> Stats {
        Stats {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0.0 {
            return 0.0;
        }
        let mean = self.sum / self.count;
        match criterion {
            Criterion::Mse => (self.sum_sq / self.count - mean * mean).max(0.0),
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
        }
    }

    /// Impurity weighted by sample count
    fn weighted(&self, criterion: Criterion) -> f64 {
        self.count * self.impurity(criterion)
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; all when `None`
    pub max_features: Option<usize>,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(criterion: Criterion) -> Self {
        Self {
            criterion,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            nodes: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Grow the tree on `rows` of `x` (repeats allowed, as in a bootstrap sample).
    pub fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<f64>, rows: &[usize], rng: &mut ChaCha8Rng) {
        self.nodes.clear();
        let mut importances = vec![0.0; x.ncols()];
        self.grow(x, y, rows.to_vec(), 0, rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.importances = importances;
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> usize {
        let mut stats = Stats::default();
        for &i in &rows {
            stats.add(y[i]);
        }
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: stats.sum / stats.count.max(1.0),
        });

        let parent = stats.weighted(self.criterion);
        let stop = rows.len() < self.min_samples_split
            || self.max_depth.map_or(false, |d| depth >= d)
            || parent <= 1e-12 * stats.count;
        if stop {
            return node_id;
        }

        let best = match self.best_split(x, y, &rows, &stats, rng) {
            Some(c) if parent - c.score > 1e-10 * parent.max(1e-12) => c,
            _ => return node_id,
        };

        importances[best.feature] += parent - best.score;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| x[[i, best.feature]] <= best.threshold);

        let left = self.grow(x, y, left_rows, depth + 1, rng, importances);
        let right = self.grow(x, y, right_rows, depth + 1, rng, importances);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        total: &Stats,
        rng: &mut ChaCha8Rng,
    ) -> Option<Candidate> {
        let n_features = x.ncols();
        let features: Vec<usize> = match self.max_features {
            Some(k) if k < n_features => sample(rng, n_features, k.max(1)).into_vec(),
            _ => (0..n_features).collect(),
        };

        let mut best: Option<Candidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(rows.len());
        for feature in features {
            pairs.clear();
            pairs.extend(rows.iter().map(|&i| (x[[i, feature]], y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Stats::default();
            for k in 0..pairs.len() - 1 {
                left.add(pairs[k].1);
                let (here, next) = (pairs[k].0, pairs[k + 1].0);
                if here == next {
                    continue;
                }
                let n_left = k + 1;
                if n_left < self.min_samples_leaf || pairs.len() - n_left < self.min_samples_leaf {
                    continue;
                }

                let right = total.minus(&left);
                let score = left.weighted(self.criterion) + right.weighted(self.criterion);
                if best.as_ref().map_or(true, |b| score < b.score) {
                    let mut threshold = (here + next) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(Candidate { feature, threshold, score });
                }
            }
        }
        best
    }

    /// Index of the leaf `row` falls into.
    pub fn apply(&self, row: ArrayView1<f64>) -> usize {
        let mut id = 0;
        while let Some(Node::Split { feature, threshold, left, right }) = self.nodes.get(id) {
            id = if row[*feature] <= *threshold { *left } else { *right };
        }
        id
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self.nodes.get(self.apply(row)) {
            Some(Node::Leaf { value }) => *value,
            _ => 0.0,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Overwrite a leaf value (used by boosting's Newton step).
    pub fn set_leaf_value(&mut self, node: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(node) {
            *value = new_value;
        }
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn has_splits(&self) -> bool {
        self.nodes.len() > 1
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}
