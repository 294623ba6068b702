use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::ValueError;
use crate::features::FeatureRecord;
use crate::valuation::PredictionResult;

/// Objectives whose raw margin is the prediction itself.
const IDENTITY_LINK_OBJECTIVES: [&str; 4] = [
    "reg:squarederror",
    "reg:linear",
    "reg:absoluteerror",
    "reg:pseudohubererror",
];

/// A trained regressor over a fixed, ordered list of input columns.
///
/// Rows passed to [`ValueModel::predict`] hold one value per entry of
/// [`ValueModel::feature_names`], in that order. `NaN` marks a missing value.
pub trait ValueModel: Send + Sync {
    fn feature_names(&self) -> &[String];

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ValueError>;
}

#[derive(Debug, Deserialize)]
struct XgbModelFile {
    learner: XgbLearner,
}

#[derive(Debug, Deserialize)]
struct XgbLearner {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: XgbBooster,
    learner_model_param: XgbLearnerParam,
    objective: XgbObjective,
}

#[derive(Debug, Deserialize)]
struct XgbBooster {
    name: String,
    #[serde(default)]
    model: Value,
}

#[derive(Debug, Deserialize)]
struct XgbGbtreeModel {
    trees: Vec<XgbTree>,
}

#[derive(Debug, Deserialize)]
struct XgbLearnerParam {
    base_score: Value,
}

#[derive(Debug, Deserialize)]
struct XgbObjective {
    name: String,
}

#[derive(Debug, Deserialize)]
struct XgbTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    // 0/1 in most releases, booleans in a few.
    #[serde(default)]
    default_left: Vec<Value>,
    #[serde(default)]
    split_type: Vec<i64>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_xgb(tree: &XgbTree, tree_idx: usize, n_features: usize) -> Result<Self> {
        let n = tree.left_children.len();
        if n == 0 {
            bail!("tree {tree_idx} has no nodes");
        }
        if tree.right_children.len() != n
            || tree.split_indices.len() != n
            || tree.split_conditions.len() != n
            || (!tree.default_left.is_empty() && tree.default_left.len() != n)
        {
            bail!("tree {tree_idx} has node arrays of different lengths");
        }
        if tree.split_type.iter().any(|t| *t != 0) {
            bail!("tree {tree_idx} uses categorical splits, which are not supported");
        }

        let mut nodes = Vec::with_capacity(n);
        for idx in 0..n {
            let left = tree.left_children[idx];
            if left == -1 {
                nodes.push(Node::Leaf(tree.split_conditions[idx] as f32));
                continue;
            }
            let right = tree.right_children[idx];
            let child_ok = |c: i64| c > idx as i64 && (c as usize) < n;
            if !child_ok(left) || !child_ok(right) {
                bail!("tree {tree_idx} node {idx} has out-of-order children ({left}, {right})");
            }
            let feature = tree.split_indices[idx];
            if feature < 0 || feature as usize >= n_features {
                bail!("tree {tree_idx} node {idx} splits on unknown feature index {feature}");
            }
            let default_left = tree
                .default_left
                .get(idx)
                .map(flag_value)
                .unwrap_or(false);
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: tree.split_conditions[idx] as f32,
                left: left as usize,
                right: right as usize,
                default_left,
            });
        }
        Ok(Self { nodes })
    }

    /// Inputs are narrowed to `f32` before comparing, as XGBoost does.
    fn score(&self, row: &[f64]) -> f32 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row[feature] as f32;
                    idx = if x.is_nan() {
                        if default_left { left } else { right }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn flag_value(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn parse_base_score(raw: &Value) -> Result<f64> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("base_score is not finite")),
        Value::String(s) => {
            // XGBoost 3 writes vector-valued intercepts as "[1.05E1]".
            let cleaned = s.trim().trim_start_matches('[').trim_end_matches(']');
            let first = cleaned.split(',').next().unwrap_or_default().trim();
            first
                .parse::<f64>()
                .with_context(|| format!("parse base_score '{s}'"))
        }
        other => Err(anyhow!("unexpected base_score value {other}")),
    }
}

/// Gradient-boosted tree ensemble read from XGBoost's JSON model format.
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    feature_names: Vec<String>,
    base_score: f32,
    objective: String,
    trees: Vec<Tree>,
}

impl GradientBoostedModel {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: XgbModelFile = serde_json::from_str(raw).context("parse xgboost model json")?;
        let learner = file.learner;

        if learner.gradient_booster.name != "gbtree" {
            bail!(
                "unsupported booster '{}', expected gbtree",
                learner.gradient_booster.name
            );
        }
        let objective = learner.objective.name;
        if !IDENTITY_LINK_OBJECTIVES.contains(&objective.as_str()) {
            bail!("unsupported objective '{objective}'");
        }
        if learner.feature_names.is_empty() {
            bail!("model declares no feature names; retrain on a named dataframe");
        }
        let mut seen = HashSet::new();
        if let Some(dup) = learner
            .feature_names
            .iter()
            .find(|name| !seen.insert(name.as_str()))
        {
            bail!("duplicate feature name '{dup}'");
        }

        let base_score = parse_base_score(&learner.learner_model_param.base_score)?;
        let gbtree: XgbGbtreeModel = serde_json::from_value(learner.gradient_booster.model)
            .context("parse gbtree model")?;
        let n_features = learner.feature_names.len();
        let trees = gbtree
            .trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| Tree::from_xgb(tree, idx, n_features))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            feature_names: learner.feature_names,
            base_score: base_score as f32,
            objective,
            trees,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read value model {}", path.display()))?;
        let model = Self::from_json_str(&raw)
            .with_context(|| format!("load value model {}", path.display()))?;
        info!(
            trees = model.trees.len(),
            features = model.feature_names.len(),
            objective = %model.objective,
            "loaded value model from {}",
            path.display()
        );
        Ok(model)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score as f64
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    fn score_row(&self, row: &[f64]) -> f64 {
        let margin = self.trees.iter().map(|t| t.score(row)).sum::<f32>();
        (self.base_score + margin) as f64
    }
}

impl ValueModel for GradientBoostedModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ValueError> {
        rows.iter()
            .enumerate()
            .map(|(idx, row)| {
                if row.len() != self.feature_names.len() {
                    return Err(ValueError::ModelInference(format!(
                        "row {idx} has {} values, model expects {}",
                        row.len(),
                        self.feature_names.len()
                    )));
                }
                Ok(self.score_row(row))
            })
            .collect()
    }
}

static SHARED_MODEL: OnceCell<Arc<GradientBoostedModel>> = OnceCell::new();

/// Loads the model on first call; later calls return the cached instance.
pub fn shared_model(path: &Path) -> Result<Arc<GradientBoostedModel>> {
    SHARED_MODEL
        .get_or_try_init(|| GradientBoostedModel::load(path).map(Arc::new))
        .cloned()
}

/// Scores one manual entry.
pub fn predict_one(
    model: &dyn ValueModel,
    record: &FeatureRecord,
) -> Result<PredictionResult, ValueError> {
    let schema = model.feature_names();
    let expected: HashSet<&str> = schema.iter().map(String::as_str).collect();
    let actual = record.key_set();
    if expected != actual || record.len() != schema.len() {
        let mut missing: Vec<&str> = expected.difference(&actual).copied().collect();
        let mut unexpected: Vec<&str> = actual.difference(&expected).copied().collect();
        missing.sort_unstable();
        unexpected.sort_unstable();
        return Err(ValueError::ModelInference(format!(
            "feature record does not match model schema (missing: [{}], unexpected: [{}])",
            missing.join(", "),
            unexpected.join(", ")
        )));
    }

    let row: Vec<f64> = schema
        .iter()
        .map(|name| record.get(name).unwrap_or(f64::NAN))
        .collect();
    let outputs = model.predict(std::slice::from_ref(&row))?;
    let Some(predicted_log) = outputs.first().copied() else {
        return Err(ValueError::ModelInference(
            "model returned no prediction".to_string(),
        ));
    };
    PredictionResult::from_log(predicted_log)
}
