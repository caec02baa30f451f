// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Post-retrieval pipeline stages
//!
//! Typed stage descriptors applied to ANN hits after the vector-search
//! stage: metadata filtering, field projection, computed fields, and
//! sorting. Stages run strictly in the order given; a later stage may
//! reference a field an earlier stage produced, so reordering a stage
//! chain changes its meaning.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A document that came out of the vector-search stage, carrying its
/// similarity score alongside the (possibly reshaped) document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Value,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Structured boolean predicate over document fields.
///
/// A predicate referencing a field the document does not carry is a
/// non-match, never an error. `Predicate::all(vec![])` matches every
/// document and stands for "unrestricted".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Cmp {
        field: String,
        op: CmpOp,
        value: Value,
    },
    Regex {
        field: String,
        pattern: String,
    },
}

/// Error constructing or validating a stage descriptor
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

impl Predicate {
    /// Unrestricted predicate (matches every document)
    pub fn unrestricted() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn all(preds: Vec<Predicate>) -> Self {
        Predicate::All(preds)
    }

    pub fn any(preds: Vec<Predicate>) -> Self {
        Predicate::Any(preds)
    }

    pub fn cmp(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Predicate::Cmp {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Regex predicate on a string field. The pattern is validated here so
    /// evaluation cannot fail later.
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Result<Self, StageError> {
        let pattern = pattern.into();
        Regex::new(&pattern).map_err(|e| StageError::InvalidRegex {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Predicate::Regex {
            field: field.into(),
            pattern,
        })
    }

    /// True when this predicate matches every document
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Predicate::All(p) if p.is_empty())
    }

    /// Every field path this predicate references
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::All(preds) | Predicate::Any(preds) => {
                for p in preds {
                    p.collect_fields(out);
                }
            }
            Predicate::Cmp { field, .. } | Predicate::Regex { field, .. } => {
                out.push(field.as_str());
            }
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Predicate::All(preds) => preds.iter().all(|p| p.matches(doc)),
            Predicate::Any(preds) => preds.iter().any(|p| p.matches(doc)),
            Predicate::Cmp { field, op, value } => match lookup_path(doc, field) {
                Some(actual) => compare_values(actual, value)
                    .map(|ord| match op {
                        CmpOp::Eq => ord == Ordering::Equal,
                        CmpOp::Ne => ord != Ordering::Equal,
                        CmpOp::Gt => ord == Ordering::Greater,
                        CmpOp::Gte => ord != Ordering::Less,
                        CmpOp::Lt => ord == Ordering::Less,
                        CmpOp::Lte => ord != Ordering::Greater,
                    })
                    .unwrap_or(false),
                None => false,
            },
            Predicate::Regex { field, pattern } => match lookup_path(doc, field) {
                Some(Value::String(s)) => Regex::new(pattern)
                    .map(|re| re.is_match(s))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

/// Numeric expression evaluated against a document.
///
/// Evaluation yields `None` for missing or non-numeric operands. `Avg`
/// ignores missing operands and is `None` only when every operand is
/// missing; `Sum` and `Product` are `None` as soon as any operand is,
/// so a null average propagates through a weighted blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldExpr {
    Field(String),
    Literal(f64),
    Avg(Vec<FieldExpr>),
    Sum(Vec<FieldExpr>),
    Product(Vec<FieldExpr>),
}

impl FieldExpr {
    pub fn field(path: impl Into<String>) -> Self {
        FieldExpr::Field(path.into())
    }

    pub fn eval(&self, doc: &Value) -> Option<f64> {
        match self {
            FieldExpr::Field(path) => lookup_path(doc, path).and_then(Value::as_f64),
            FieldExpr::Literal(v) => Some(*v),
            FieldExpr::Avg(operands) => {
                let values: Vec<f64> = operands.iter().filter_map(|op| op.eval(doc)).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            FieldExpr::Sum(operands) => operands
                .iter()
                .map(|op| op.eval(doc))
                .try_fold(0.0, |acc, v| v.map(|v| acc + v)),
            FieldExpr::Product(operands) => operands
                .iter()
                .map(|op| op.eval(doc))
                .try_fold(1.0, |acc, v| v.map(|v| acc * v)),
        }
    }
}

/// A single post-retrieval stage. Applied strictly in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PostStage {
    /// Keep only documents matching the predicate
    Filter(Predicate),
    /// Reshape each document to the listed field paths plus computed fields
    Project {
        fields: Vec<String>,
        computed: Vec<(String, FieldExpr)>,
    },
    /// Add one computed field to each document (null when the expression
    /// evaluates to nothing)
    AddField { name: String, expr: FieldExpr },
    /// Reorder documents by a field value; null keys sort after every
    /// number in descending order
    Sort {
        field: String,
        direction: SortDirection,
    },
}

impl PostStage {
    pub fn name(&self) -> &'static str {
        match self {
            PostStage::Filter(_) => "filter",
            PostStage::Project { .. } => "project",
            PostStage::AddField { .. } => "add_field",
            PostStage::Sort { .. } => "sort",
        }
    }
}

/// Apply one stage to an ordered hit set, returning the reshaped set.
pub fn apply_stage(docs: Vec<ScoredDocument>, stage: &PostStage) -> Vec<ScoredDocument> {
    match stage {
        PostStage::Filter(predicate) => docs
            .into_iter()
            .filter(|d| predicate.matches(&d.document))
            .collect(),
        PostStage::Project { fields, computed } => docs
            .into_iter()
            .map(|mut d| {
                d.document = project_document(&d.document, fields, computed);
                d
            })
            .collect(),
        PostStage::AddField { name, expr } => docs
            .into_iter()
            .map(|mut d| {
                let value = number_or_null(expr.eval(&d.document));
                if let Value::Object(map) = &mut d.document {
                    map.insert(name.clone(), value);
                }
                d
            })
            .collect(),
        PostStage::Sort { field, direction } => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                let ka = lookup_path(&a.document, field);
                let kb = lookup_path(&b.document, field);
                let ord = compare_sort_keys(ka, kb);
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
            docs
        }
    }
}

/// Apply a stage chain in order.
pub fn apply_stages(mut docs: Vec<ScoredDocument>, stages: &[PostStage]) -> Vec<ScoredDocument> {
    for stage in stages {
        docs = apply_stage(docs, stage);
    }
    docs
}

/// Review-subscore fields blended by the boosting chain
const REVIEW_SUBSCORE_FIELDS: [&str; 6] = [
    "review_scores.review_scores_accuracy",
    "review_scores.review_scores_cleanliness",
    "review_scores.review_scores_checkin",
    "review_scores.review_scores_communication",
    "review_scores.review_scores_location",
    "review_scores.review_scores_value",
];

/// The reusable document-boosting chain: average the review subscores,
/// blend quality against review volume at 0.9/0.1, then sort by the
/// blended score. The three stages depend on each other's output fields,
/// so they must run in exactly this order.
pub fn review_boost_stages() -> Vec<PostStage> {
    vec![
        PostStage::AddField {
            name: "average_review_score".to_string(),
            expr: FieldExpr::Avg(
                REVIEW_SUBSCORE_FIELDS
                    .iter()
                    .map(|f| FieldExpr::field(*f))
                    .collect(),
            ),
        },
        PostStage::AddField {
            name: "combined_score".to_string(),
            expr: FieldExpr::Sum(vec![
                FieldExpr::Product(vec![
                    FieldExpr::Literal(0.9),
                    FieldExpr::field("average_review_score"),
                ]),
                FieldExpr::Product(vec![
                    FieldExpr::Literal(0.1),
                    FieldExpr::field("number_of_reviews"),
                ]),
            ]),
        },
        PostStage::Sort {
            field: "combined_score".to_string(),
            direction: SortDirection::Descending,
        },
    ]
}

/// Resolve a dotted path ("address.country") inside a document.
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn project_document(doc: &Value, fields: &[String], computed: &[(String, FieldExpr)]) -> Value {
    let mut out = Map::new();
    for path in fields {
        if let Some(value) = lookup_path(doc, path) {
            insert_at_path(&mut out, path, value.clone());
        }
    }
    for (name, expr) in computed {
        out.insert(name.clone(), number_or_null(expr.eval(doc)));
    }
    Value::Object(out)
}

fn insert_at_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(inner) = entry {
                insert_at_path(inner, rest, value);
            }
        }
    }
}

fn number_or_null(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Cross-type ordering for comparison predicates. Only values of the same
/// kind compare; mixed kinds are incomparable and the predicate fails.
fn compare_values(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Sort-key ordering: null sorts below every number, numbers below strings.
fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }
    match (rank(a), rank(b)) {
        (1, 1) => {
            let (Some(Value::Number(na)), Some(Value::Number(nb))) = (a, b) else {
                return Ordering::Equal;
            };
            na.as_f64()
                .zip(nb.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .unwrap_or(Ordering::Equal)
        }
        (2, 2) => {
            let (Some(Value::String(sa)), Some(Value::String(sb))) = (a, b) else {
                return Ordering::Equal;
            };
            sa.cmp(sb)
        }
        (ra, rb) => ra.cmp(&rb),
    }
}
