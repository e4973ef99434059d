//! Filter expression compiler.
//!
//! A filter clause is a short expression such as `in [1, 2]`, `>= 10` or
//! `like "abc"` attached to a spreadsheet column or a destination property.
//! [`compile`] turns it into a [`Filter`] that can be evaluated against rows
//! ([`tabular`]) or sent to the document store as a query filter ([`remote`]).

pub mod remote;
pub mod tabular;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Result, SyncError};
use crate::models::Scalar;

pub use remote::create_remote_filter;
pub use tabular::filter_rows;

/// What a filter clause is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterTarget {
    Column,
    Property,
}

/// One active row of the filters table.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub target: FilterTarget,
    pub name: String,
    /// `number`/`text` for columns, the schema type for properties.
    pub value_type: String,
    pub expression: String,
}

impl FilterClause {
    pub fn compile(&self) -> Result<Filter> {
        compile(&self.expression, &self.name, &self.value_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    DoesNotEqual,
    Contains,
    DoesNotContain,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl Comparison {
    /// Name of the comparison in the store's query language.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::DoesNotEqual => "does_not_equal",
            Self::Contains => "contains",
            Self::DoesNotContain => "does_not_contain",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqualTo => "greater_than_or_equal_to",
            Self::LessThan => "less_than",
            Self::LessThanOrEqualTo => "less_than_or_equal_to",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub op: Comparison,
    pub value: Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf(Leaf),
    Any(Vec<Leaf>),
    All(Vec<Leaf>),
}

/// A compiled clause bound to its column or property.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub value_type: String,
    pub predicate: Predicate,
}

/// Property types holding several values, compared with `contains`.
pub fn is_multi_valued(value_type: &str) -> bool {
    value_type == "multi_select"
}

/// Builders receive the captures, the expression as written and whether the
/// type is multi-valued.
type Builder = fn(&Captures<'_>, &str, bool) -> Result<Predicate>;

/// Grammar rules, tried in order. The first pattern that matches decides.
const RULES: [(&str, Builder); 7] = [
    (r"^not\s+in\s*\[\s*([^\]]+)\s*\]$", build_not_in),
    (r"^in\s*\[\s*([^\]]+)\s*\]", build_in),
    (r"^(>=|>|<=|<|＞＝|＞|＜＝|＜|≥|≤)", build_inequality),
    (r"^not\s+(.+)", build_not_equal),
    (r"^=\s*(.+)", build_equal),
    (r"^(.+)\s+or\s+(.+)$", build_or),
    (r#"^(not\s+)?like\s+"([^"]+)"$"#, build_like),
];

static COMPILED_RULES: OnceLock<Vec<(Regex, Builder)>> = OnceLock::new();

fn rules() -> &'static [(Regex, Builder)] {
    COMPILED_RULES.get_or_init(|| {
        RULES
            .iter()
            .map(|(pattern, build)| {
                (
                    Regex::new(pattern).expect("Invalid filter grammar regex"),
                    *build,
                )
            })
            .collect()
    })
}

/// Compiles a filter expression for the named column or property.
pub fn compile(expression: &str, name: &str, value_type: &str) -> Result<Filter> {
    let trimmed = expression.trim();
    let multi = is_multi_valued(value_type);

    for (pattern, build) in rules() {
        if let Some(caps) = pattern.captures(trimmed) {
            let predicate = build(&caps, expression, multi)?;
            return Ok(Filter {
                name: name.to_string(),
                value_type: value_type.to_string(),
                predicate,
            });
        }
    }
    Err(SyncError::InvalidFilterExpression(expression.to_string()))
}

fn equality(multi: bool) -> Comparison {
    if multi {
        Comparison::Contains
    } else {
        Comparison::Equals
    }
}

fn inequality(multi: bool) -> Comparison {
    if multi {
        Comparison::DoesNotContain
    } else {
        Comparison::DoesNotEqual
    }
}

fn list_leaves(list: &str, op: Comparison) -> Vec<Leaf> {
    list.split(',')
        .map(|token| Leaf {
            op,
            value: Scalar::parse_literal(token),
        })
        .collect()
}

fn build_not_in(caps: &Captures<'_>, _: &str, multi: bool) -> Result<Predicate> {
    Ok(Predicate::All(list_leaves(&caps[1], inequality(multi))))
}

fn build_in(caps: &Captures<'_>, _: &str, multi: bool) -> Result<Predicate> {
    Ok(Predicate::Any(list_leaves(&caps[1], equality(multi))))
}

/// Rewrites full-width and single-glyph comparison operators to ASCII.
pub fn normalize_inequality(expression: &str) -> String {
    expression
        .replace("＜＝", "<=")
        .replace("＞＝", ">=")
        .replace('≥', ">=")
        .replace('≤', "<=")
        .replace('＞', ">")
        .replace('＜', "<")
}

fn build_inequality(_: &Captures<'_>, expression: &str, _: bool) -> Result<Predicate> {
    let normalized = normalize_inequality(expression.trim());
    let (op, rest) = [
        (">=", Comparison::GreaterThanOrEqualTo),
        (">", Comparison::GreaterThan),
        ("<=", Comparison::LessThanOrEqualTo),
        ("<", Comparison::LessThan),
    ]
    .into_iter()
    .find_map(|(symbol, op)| normalized.strip_prefix(symbol).map(|rest| (op, rest)))
    .ok_or_else(|| SyncError::InvalidFilterExpression(expression.to_string()))?;

    if rest.trim().is_empty() {
        return Err(SyncError::InvalidFilterExpression(expression.to_string()));
    }
    Ok(Predicate::Leaf(Leaf {
        op,
        value: Scalar::parse_literal(rest),
    }))
}

fn build_not_equal(caps: &Captures<'_>, _: &str, multi: bool) -> Result<Predicate> {
    Ok(Predicate::Leaf(Leaf {
        op: inequality(multi),
        value: Scalar::parse_literal(&caps[1]),
    }))
}

fn build_equal(caps: &Captures<'_>, _: &str, multi: bool) -> Result<Predicate> {
    Ok(Predicate::Leaf(Leaf {
        op: equality(multi),
        value: Scalar::parse_literal(&caps[1]),
    }))
}

fn build_or(caps: &Captures<'_>, _: &str, multi: bool) -> Result<Predicate> {
    let op = equality(multi);
    Ok(Predicate::Any(vec![
        Leaf {
            op,
            value: Scalar::parse_literal(&caps[1]),
        },
        Leaf {
            op,
            value: Scalar::parse_literal(&caps[2]),
        },
    ]))
}

fn build_like(caps: &Captures<'_>, _: &str, _: bool) -> Result<Predicate> {
    let op = if caps.get(1).is_some() {
        Comparison::DoesNotContain
    } else {
        Comparison::Contains
    };
    Ok(Predicate::Leaf(Leaf {
        op,
        value: Scalar::parse_literal(&caps[2]),
    }))
}
