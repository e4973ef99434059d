//! Evaluating compiled filters against spreadsheet rows.

use std::cmp::Ordering;
use std::fmt;

use super::{Comparison, Filter, FilterClause, FilterTarget, Leaf, Predicate};
use crate::error::Result;
use crate::models::{Row, Scalar};

impl Filter {
    /// Whether `row` passes this filter. A missing cell only passes the
    /// negated comparisons.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.name);
        match &self.predicate {
            Predicate::Leaf(leaf) => leaf_matches(leaf, cell),
            Predicate::Any(leaves) => leaves.iter().any(|l| leaf_matches(l, cell)),
            Predicate::All(leaves) => leaves.iter().all(|l| leaf_matches(l, cell)),
        }
    }
}

fn leaf_matches(leaf: &Leaf, cell: Option<&Scalar>) -> bool {
    let Some(cell) = cell else {
        return matches!(
            leaf.op,
            Comparison::DoesNotEqual | Comparison::DoesNotContain
        );
    };
    match leaf.op {
        Comparison::Equals => compare(cell, &leaf.value) == Some(Ordering::Equal),
        Comparison::DoesNotEqual => compare(cell, &leaf.value) != Some(Ordering::Equal),
        Comparison::Contains => contains(cell, &leaf.value),
        Comparison::DoesNotContain => !contains(cell, &leaf.value),
        Comparison::GreaterThan => compare(cell, &leaf.value) == Some(Ordering::Greater),
        Comparison::GreaterThanOrEqualTo => matches!(
            compare(cell, &leaf.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparison::LessThan => compare(cell, &leaf.value) == Some(Ordering::Less),
        Comparison::LessThanOrEqualTo => matches!(
            compare(cell, &leaf.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

/// Numbers compare numerically and text lexically; mixed kinds never compare.
fn compare(cell: &Scalar, value: &Scalar) -> Option<Ordering> {
    match (cell, value) {
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn contains(cell: &Scalar, value: &Scalar) -> bool {
    cell.to_string().contains(&value.to_string())
}

/// Keeps the rows passing every column clause. Property clauses are ignored.
pub fn filter_rows(rows: Vec<Row>, clauses: &[FilterClause]) -> Result<Vec<Row>> {
    let filters = clauses
        .iter()
        .filter(|c| c.target == FilterTarget::Column)
        .map(FilterClause::compile)
        .collect::<Result<Vec<_>>>()?;

    let before = rows.len();
    let kept: Vec<Row> = rows
        .into_iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect();
    log::debug!(
        "Column filters kept {} of {} rows ({} filters)",
        kept.len(),
        before,
        filters.len()
    );
    Ok(kept)
}

struct Literal<'a>(&'a Scalar);

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Scalar::Text(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

fn write_leaf(f: &mut fmt::Formatter<'_>, column: &str, leaf: &Leaf) -> fmt::Result {
    let value = Literal(&leaf.value);
    match leaf.op {
        Comparison::Equals => write!(f, "{column} == {value}"),
        Comparison::DoesNotEqual => write!(f, "{column} != {value}"),
        Comparison::Contains => write!(f, "{column}.str.contains({value})"),
        Comparison::DoesNotContain => write!(f, "~{column}.str.contains({value})"),
        Comparison::GreaterThan => write!(f, "{column} > {value}"),
        Comparison::GreaterThanOrEqualTo => write!(f, "{column} >= {value}"),
        Comparison::LessThan => write!(f, "{column} < {value}"),
        Comparison::LessThanOrEqualTo => write!(f, "{column} <= {value}"),
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    column: &str,
    leaves: &[Leaf],
    joiner: &str,
) -> fmt::Result {
    for (i, leaf) in leaves.iter().enumerate() {
        if i > 0 {
            f.write_str(joiner)?;
        }
        f.write_str("(")?;
        write_leaf(f, column, leaf)?;
        f.write_str(")")?;
    }
    Ok(())
}

/// Renders the filter as a dataframe-style query expression.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Leaf(leaf) => write_leaf(f, &self.name, leaf),
            Predicate::Any(leaves) => write_joined(f, &self.name, leaves, " | "),
            Predicate::All(leaves) => write_joined(f, &self.name, leaves, " & "),
        }
    }
}
