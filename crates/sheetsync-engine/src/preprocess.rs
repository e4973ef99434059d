//! Column pre-processing applied to a sheet before materialization.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SyncError};
use crate::models::{ColumnType, Row, Scalar, Sheet};
use crate::store::TextRewriteOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreProcessKind {
    Int,
    Float,
    Callout,
    Quote,
    NumberedList,
    BulletedList,
    /// No reshaping; only useful together with the AI flag.
    Keep,
}

impl PreProcessKind {
    /// Reads the `Type` select of a pre-process row. Unknown names keep the
    /// column as is.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "int" => Self::Int,
            "float" => Self::Float,
            "callout" => Self::Callout,
            "quote" => Self::Quote,
            "numbered_list" => Self::NumberedList,
            "bulleted_list" => Self::BulletedList,
            other => {
                log::debug!("Unknown pre-process type {other:?}, keeping column as is");
                Self::Keep
            }
        }
    }

    fn reshape(self, text: &str) -> String {
        match self {
            Self::Callout => callout(text),
            Self::Quote => quote(text),
            Self::NumberedList => numbered_list(text),
            Self::BulletedList => bulleted_list(text),
            Self::Int | Self::Float | Self::Keep => text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreProcessRule {
    pub column: String,
    pub kind: PreProcessKind,
    /// Rewrite the column through the text oracle after reshaping.
    pub ai: bool,
}

/// Everything a template asks of the pre-processing stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreProcessPlan {
    pub rules: Vec<PreProcessRule>,
    /// Rewrite every text column without a rule of its own through the oracle.
    pub rewrite_remaining: bool,
}

pub fn callout(text: &str) -> String {
    format!("> [!⭐] {text}")
}

pub fn quote(text: &str) -> String {
    format!("> {text}")
}

/// Indent level of a line, counted in leading whitespace characters, with
/// the line's bullet stripped. A full-width space counts as one character.
fn split_indent(line: &str, width: usize) -> (usize, &str) {
    let stripped = line.trim_start();
    let level = (line.chars().count() - stripped.chars().count()) / width;
    let item = stripped.trim_start_matches(['・', '-']).trim();
    (level, item)
}

/// Numbers lines per indent level (four spaces each).
///
/// Each level keeps its own counter; an item resets every deeper counter.
pub fn numbered_list(text: &str) -> String {
    let mut counters: Vec<usize> = Vec::new();
    let mut lines = Vec::new();
    for line in text.lines() {
        let (level, item) = split_indent(line, 4);
        if item.is_empty() {
            continue;
        }
        if counters.len() <= level {
            counters.resize(level + 1, 0);
        }
        counters[level] += 1;
        counters.truncate(level + 1);
        lines.push(format!("{}{}. {item}", "    ".repeat(level), counters[level]));
    }
    lines.join("\n")
}

/// Bullets lines per indent level (two spaces each).
pub fn bulleted_list(text: &str) -> String {
    text.lines()
        .map(|line| split_indent(line, 2))
        .filter(|(_, item)| !item.is_empty())
        .map(|(level, item)| format!("{}- {item}", "  ".repeat(level)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Frames texts for a batched rewrite request.
pub fn frame_batch(items: &[(usize, String)]) -> String {
    items
        .iter()
        .map(|(index, text)| format!("<ROW {index}>\n{text}\n</ROW {index}>"))
        .collect::<Vec<_>>()
        .join("\n")
}

static ROW_BLOCK: OnceLock<Regex> = OnceLock::new();

/// Reads `<ROW i> … </ROW i>` blocks back out of a rewrite response.
///
/// Blocks whose closing index differs from the opening one are dropped.
pub fn parse_batch_response(response: &str) -> Vec<(usize, String)> {
    let pattern = ROW_BLOCK.get_or_init(|| {
        Regex::new(r"(?s)<ROW\s+(\d+)>\s*(.*?)\s*</ROW\s+(\d+)>").expect("Invalid row block regex")
    });
    pattern
        .captures_iter(response)
        .filter(|c| c[1] == c[3])
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .collect()
}

/// Applies the plan's rules to the sheet, in rule order, then rewrites the
/// remaining text columns when the plan asks for it.
///
/// `int`/`float` columns read unparseable cells as zero and become numeric.
/// Numeric columns are never rewritten wholesale, so order keys survive.
/// Rewrites are skipped with a warning when no oracle is given.
pub fn apply_plan(
    sheet: &mut Sheet,
    plan: &PreProcessPlan,
    oracle: Option<&dyn TextRewriteOracle>,
    batch_size: usize,
) -> Result<()> {
    for rule in &plan.rules {
        if !sheet.has_column(&rule.column) {
            return Err(SyncError::MissingColumn(rule.column.clone()));
        }
        log::debug!("Pre-processing column {} as {:?}", rule.column, rule.kind);
        match rule.kind {
            PreProcessKind::Int | PreProcessKind::Float => {
                for row in &mut sheet.rows {
                    let value = coerce(row.get(&rule.column), rule.kind);
                    row.set(rule.column.as_str(), value);
                }
                if let Some(column) = sheet.columns.iter_mut().find(|c| c.name == rule.column) {
                    column.ty = ColumnType::Number;
                }
                continue;
            }
            kind => {
                for row in &mut sheet.rows {
                    let text = row.text(&rule.column).unwrap_or_default();
                    row.set(rule.column.as_str(), kind.reshape(&text));
                }
            }
        }
        if rule.ai {
            rewrite_if_possible(&mut sheet.rows, &rule.column, oracle, batch_size)?;
        }
    }

    if plan.rewrite_remaining {
        let remaining: Vec<String> = sheet
            .columns
            .iter()
            .filter(|c| c.ty == ColumnType::Text)
            .filter(|c| !plan.rules.iter().any(|r| r.column == c.name))
            .map(|c| c.name.clone())
            .collect();
        log::info!("Rewriting {} remaining columns", remaining.len());
        for column in &remaining {
            rewrite_if_possible(&mut sheet.rows, column, oracle, batch_size)?;
        }
    }
    Ok(())
}

fn rewrite_if_possible(
    rows: &mut [Row],
    column: &str,
    oracle: Option<&dyn TextRewriteOracle>,
    batch_size: usize,
) -> Result<()> {
    match oracle {
        Some(oracle) => rewrite_column(rows, column, oracle, batch_size),
        None => {
            log::warn!("No text rewriter configured, leaving {column} as is");
            Ok(())
        }
    }
}

fn coerce(value: Option<&Scalar>, kind: PreProcessKind) -> Scalar {
    let number = value.and_then(|v| match v {
        Scalar::Text(s) => Scalar::parse_literal(s).as_f64(),
        other => other.as_f64(),
    });
    match kind {
        PreProcessKind::Int => Scalar::Int(number.filter(|n| n.is_finite()).map_or(0, |n| n as i64)),
        _ => Scalar::Float(number.filter(|n| n.is_finite()).unwrap_or(0.0)),
    }
}

/// Rewrites one column through the oracle in batches.
///
/// A failed batch, or any index the batch response leaves out, is rewritten
/// one text at a time.
pub fn rewrite_column(
    rows: &mut [Row],
    column: &str,
    oracle: &dyn TextRewriteOracle,
    batch_size: usize,
) -> Result<()> {
    let indices: Vec<usize> = (0..rows.len()).collect();
    for chunk in indices.chunks(batch_size.max(1)) {
        let items: Vec<(usize, String)> = chunk
            .iter()
            .map(|&i| (i, rows[i].text(column).unwrap_or_default()))
            .collect();

        let mut rewritten: BTreeMap<usize, String> = match oracle.rewrite_batch(&items) {
            Ok(response) => response.into_iter().collect(),
            Err(e) => {
                log::warn!("Batch rewrite of {column} failed, retrying one by one: {e}");
                BTreeMap::new()
            }
        };

        for (index, original) in items {
            let text = match rewritten.remove(&index) {
                Some(text) => text,
                None => {
                    log::info!("Row {index} missing from batch response, rewriting alone");
                    oracle.rewrite_one(&original)?
                }
            };
            rows[index].set(column, text.trim().to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;

    #[rstest]
    #[case("a\nb\n\nc", "1. a\n2. b\n3. c")]
    #[case("・a\n    - b\n    - c\nd\n    e", "1. a\n    1. b\n    2. c\n2. d\n    1. e")]
    #[case("  \n", "")]
    fn numbered_lists(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(numbered_list(input), expected);
    }

    #[test]
    fn full_width_indentation_nests() {
        assert_eq!(numbered_list("a\n\u{3000}\u{3000}\u{3000}\u{3000}b"), "1. a\n    1. b");
        assert_eq!(bulleted_list("・a\n\u{3000}\u{3000}・b"), "- a\n  - b");
    }

    #[test]
    fn bulleted_list_uses_two_space_levels() {
        assert_eq!(bulleted_list("・a\n  ・b\n\n- c"), "- a\n  - b\n- c");
    }

    #[test]
    fn reshaping_wrappers() {
        assert_eq!(callout("hi"), "> [!⭐] hi");
        assert_eq!(quote("hi"), "> hi");
    }

    #[test]
    fn batch_codec() {
        let framed = frame_batch(&[(0, "one".into()), (1, "two\nlines".into())]);
        assert_eq!(framed, "<ROW 0>\none\n</ROW 0>\n<ROW 1>\ntwo\nlines\n</ROW 1>");

        let response = "noise <ROW 0>\n ONE \n</ROW 0>\n<ROW 1>bad</ROW 2>\n<ROW 3>x</ROW 3>";
        assert_eq!(
            parse_batch_response(response),
            vec![(0, "ONE".to_string()), (3, "x".to_string())]
        );
    }

    #[test]
    fn numeric_coercion_falls_back_to_zero() {
        let rows = vec![
            [("n", "12")].into_iter().collect(),
            [("n", "abc")].into_iter().collect(),
        ];
        let mut sheet = Sheet::from_rows(vec!["n".into()], rows);
        assert_eq!(sheet.column_type("n"), Some(ColumnType::Text));

        let plan = PreProcessPlan {
            rules: vec![PreProcessRule {
                column: "n".into(),
                kind: PreProcessKind::Int,
                ai: false,
            }],
            rewrite_remaining: false,
        };
        apply_plan(&mut sheet, &plan, None, 20).unwrap();

        assert_eq!(sheet.rows[0].get("n"), Some(&Scalar::Int(12)));
        assert_eq!(sheet.rows[1].get("n"), Some(&Scalar::Int(0)));
        assert_eq!(sheet.column_type("n"), Some(ColumnType::Number));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let mut sheet = Sheet::from_rows(vec!["a".into()], vec![]);
        let plan = PreProcessPlan {
            rules: vec![PreProcessRule {
                column: "b".into(),
                kind: PreProcessKind::Quote,
                ai: false,
            }],
            rewrite_remaining: false,
        };
        assert!(matches!(
            apply_plan(&mut sheet, &plan, None, 20),
            Err(SyncError::MissingColumn(c)) if c == "b"
        ));
    }

    /// Uppercases texts, dropping the given indices from batch responses.
    struct Shouting {
        drop: Vec<usize>,
        batches: RefCell<Vec<usize>>,
        singles: RefCell<Vec<String>>,
    }

    impl TextRewriteOracle for Shouting {
        fn rewrite_batch(
            &self,
            items: &[(usize, String)],
        ) -> std::result::Result<Vec<(usize, String)>, TransportError> {
            self.batches.borrow_mut().push(items.len());
            let response = items
                .iter()
                .filter(|(i, _)| !self.drop.contains(i))
                .map(|(i, t)| (*i, t.to_uppercase()))
                .collect::<Vec<_>>();
            Ok(parse_batch_response(&frame_batch(&response)))
        }

        fn rewrite_one(&self, text: &str) -> std::result::Result<String, TransportError> {
            self.singles.borrow_mut().push(text.to_string());
            Ok(format!("{} ", text.to_uppercase()))
        }
    }

    #[test]
    fn missing_batch_entries_fall_back_to_single_rewrites() {
        let oracle = Shouting {
            drop: vec![1],
            batches: RefCell::default(),
            singles: RefCell::default(),
        };
        let mut rows: Vec<Row> = ["a", "b", "c"]
            .into_iter()
            .map(|t| [("body", t)].into_iter().collect())
            .collect();

        rewrite_column(&mut rows, "body", &oracle, 2).unwrap();

        let texts: Vec<_> = rows.iter().filter_map(|r| r.text("body")).collect();
        assert_eq!(texts, ["A", "B", "C"]);
        assert_eq!(*oracle.batches.borrow(), [2, 1]);
        assert_eq!(*oracle.singles.borrow(), ["b"]);
    }

    #[test]
    fn ai_rules_reshape_before_rewriting() {
        let oracle = Shouting {
            drop: vec![],
            batches: RefCell::default(),
            singles: RefCell::default(),
        };
        let mut sheet = Sheet::from_rows(
            vec!["body".into()],
            vec![[("body", "note")].into_iter().collect()],
        );
        let plan = PreProcessPlan {
            rules: vec![PreProcessRule {
                column: "body".into(),
                kind: PreProcessKind::Quote,
                ai: true,
            }],
            rewrite_remaining: false,
        };

        apply_plan(&mut sheet, &plan, Some(&oracle), 20).unwrap();

        assert_eq!(sheet.rows[0].text("body").as_deref(), Some("> NOTE"));
    }

    #[test]
    fn remaining_text_columns_are_rewritten() {
        let oracle = Shouting {
            drop: vec![],
            batches: RefCell::default(),
            singles: RefCell::default(),
        };
        let rows = vec![
            [
                ("order", Scalar::Int(1)),
                ("title", Scalar::from("intro")),
                ("body", Scalar::from("text")),
                ("tag", Scalar::from("misc")),
            ]
            .into_iter()
            .collect(),
        ];
        let mut sheet = Sheet::from_rows(
            vec!["order".into(), "title".into(), "body".into(), "tag".into()],
            rows,
        );
        let plan = PreProcessPlan {
            rules: vec![PreProcessRule {
                column: "body".into(),
                kind: PreProcessKind::Quote,
                ai: false,
            }],
            rewrite_remaining: true,
        };

        apply_plan(&mut sheet, &plan, Some(&oracle), 20).unwrap();

        let row = &sheet.rows[0];
        assert_eq!(row.get("order"), Some(&Scalar::Int(1)));
        assert_eq!(row.text("title").as_deref(), Some("INTRO"));
        assert_eq!(row.text("tag").as_deref(), Some("MISC"));
        assert_eq!(row.text("body").as_deref(), Some("> text"));
        assert_eq!(*oracle.batches.borrow(), [1, 1]);
    }

    #[test]
    fn remaining_columns_stay_without_an_oracle() {
        let mut sheet = Sheet::from_rows(
            vec!["title".into()],
            vec![[("title", "intro")].into_iter().collect()],
        );
        let plan = PreProcessPlan {
            rules: vec![],
            rewrite_remaining: true,
        };

        apply_plan(&mut sheet, &plan, None, 20).unwrap();

        assert_eq!(sheet.rows[0].text("title").as_deref(), Some("intro"));
    }
}
