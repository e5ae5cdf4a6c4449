//! Data-layer access filters.
//!
//! An [`AccessQuery`] expresses which records of a resource type a user may
//! see. It renders to a Mongo-style filter document for storage layers and
//! can also be evaluated in memory against a record.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::policy::{compare, lookup_path};
use crate::types::Operator;

/// A single `field <op> value` test with every reference already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPredicate {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl FieldPredicate {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// `field == value`
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value.into())
    }

    /// Evaluate against a record.
    #[must_use]
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        compare(self.operator, lookup_path(record, &self.field), &self.value)
    }

    /// Right-hand side of the filter document entry for this predicate.
    fn render(&self) -> Value {
        match self.operator {
            Operator::Eq => self.value.clone(),
            Operator::Ne => json!({ "$ne": self.value }),
            Operator::In => json!({ "$in": self.value }),
            Operator::Nin => json!({ "$nin": self.value }),
            Operator::Gt => json!({ "$gt": self.value }),
            Operator::Gte => json!({ "$gte": self.value }),
            Operator::Lt => json!({ "$lt": self.value }),
            Operator::Lte => json!({ "$lte": self.value }),
            Operator::Contains => match &self.value {
                Value::String(s) => json!({ "$regex": regex::escape(s) }),
                other => json!({ "$regex": other }),
            },
            Operator::Exists => json!({ "$exists": self.value != Value::Bool(false) }),
            // Never constructed by the guard; renders as an impossible match.
            Operator::Unknown => json!({ "$in": [] }),
        }
    }

    fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(self.field.clone(), self.render());
        Value::Object(doc)
    }
}

/// Records a user may access.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "clauses", rename_all = "snake_case")]
pub enum AccessQuery {
    /// Every record (role bypass or unconditioned permission).
    All,
    /// No record. Rendered as `{"id": null}`.
    None,
    /// Records matching at least one clause; a clause is a conjunction of
    /// predicates.
    Any(Vec<Vec<FieldPredicate>>),
}

impl AccessQuery {
    /// Build a query from OR-combined clauses, normalizing the degenerate
    /// cases: no clause denies everything, an empty clause allows everything.
    #[must_use]
    pub fn from_clauses(clauses: Vec<Vec<FieldPredicate>>) -> Self {
        if clauses.is_empty() {
            Self::None
        } else if clauses.iter().any(Vec::is_empty) {
            Self::All
        } else {
            Self::Any(clauses)
        }
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::All)
    }

    #[must_use]
    pub fn is_deny_all(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Evaluate against a record.
    #[must_use]
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Any(clauses) => clauses
                .iter()
                .any(|clause| clause.iter().all(|p| p.matches(record))),
        }
    }

    /// Render as a filter document.
    #[must_use]
    pub fn to_filter_document(&self) -> Value {
        match self {
            Self::All => json!({}),
            Self::None => json!({ "id": null }),
            Self::Any(clauses) => {
                let mut docs: Vec<Value> = clauses.iter().map(|c| clause_document(c)).collect();
                if docs.len() == 1 {
                    docs.remove(0)
                } else {
                    json!({ "$or": docs })
                }
            }
        }
    }
}

fn clause_document(clause: &[FieldPredicate]) -> Value {
    match clause {
        [single] => single.to_document(),
        many => json!({ "$and": many.iter().map(FieldPredicate::to_document).collect::<Vec<_>>() }),
    }
}
