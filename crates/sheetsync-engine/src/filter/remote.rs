//! Rendering compiled filters as document-store query filters.

use serde_json::{Map, Value, json};

use super::{Filter, FilterClause, FilterTarget, Leaf, Predicate};
use crate::error::Result;

impl Filter {
    /// The filter as a store query object, e.g.
    /// `{"property": "P", "number": {"equals": 5}}` or `{"or": [...]}`.
    pub fn to_remote(&self) -> Value {
        match &self.predicate {
            Predicate::Leaf(leaf) => self.remote_leaf(leaf),
            Predicate::Any(leaves) => json!({ "or": self.remote_leaves(leaves) }),
            Predicate::All(leaves) => json!({ "and": self.remote_leaves(leaves) }),
        }
    }

    fn remote_leaves(&self, leaves: &[Leaf]) -> Vec<Value> {
        leaves.iter().map(|l| self.remote_leaf(l)).collect()
    }

    fn remote_leaf(&self, leaf: &Leaf) -> Value {
        let mut condition = Map::new();
        condition.insert(leaf.op.as_str().to_string(), json!(leaf.value));

        let mut object = Map::new();
        object.insert("property".to_string(), Value::String(self.name.clone()));
        object.insert(self.value_type.clone(), Value::Object(condition));
        Value::Object(object)
    }
}

/// Combines every property clause into one `{"and": [...]}` query filter,
/// so a document must pass all of them.
///
/// Returns `None` when there are no property clauses. Any clause that fails
/// to compile fails the whole filter.
pub fn create_remote_filter(clauses: &[FilterClause]) -> Result<Option<Value>> {
    let filters = clauses
        .iter()
        .filter(|c| c.target == FilterTarget::Property)
        .map(|c| c.compile().map(|f| f.to_remote()))
        .collect::<Result<Vec<_>>>()?;

    if filters.is_empty() {
        return Ok(None);
    }
    Ok(Some(json!({ "and": filters })))
}
