//! Decoding the settings databases of a template page.
//!
//! Each settings database is a small table edited by hand in the store. Its
//! rows arrive as [`DocumentSummary`] values with store-native properties.

use serde_json::Value;

use super::block_var::BlockVarBinding;
use crate::error::{Result, SyncError};
use crate::filter::{FilterClause, FilterTarget};
use crate::models::{Annotations, ColumnType, Cover, Icon, InlineSpan, Row, Sheet, plain_text};
use crate::preprocess::{PreProcessKind, PreProcessPlan, PreProcessRule};
use crate::properties::PropertyBinding;
use crate::store::{DatabaseSchema, DocumentSummary};

fn property<'a>(row: &'a DocumentSummary, table: &str, name: &str) -> Result<&'a Value> {
    row.property(name)
        .ok_or_else(|| SyncError::malformed(table, format!("row {} has no {name:?} property", row.id)))
}

/// Concatenated plain text of a `title` or `rich_text` property.
fn text_of(value: &Value, kind: &str) -> String {
    value
        .get(kind)
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<InlineSpan>>(v).ok())
        .map(|spans| plain_text(&spans))
        .unwrap_or_default()
}

fn title(row: &DocumentSummary, table: &str, name: &str) -> Result<String> {
    let text = text_of(property(row, table, name)?, "title").trim().to_string();
    if text.is_empty() {
        return Err(SyncError::malformed(table, format!("{name:?} is empty in row {}", row.id)));
    }
    Ok(text)
}

fn rich_text(row: &DocumentSummary, table: &str, name: &str) -> Result<String> {
    Ok(text_of(property(row, table, name)?, "rich_text").trim().to_string())
}

fn select(row: &DocumentSummary, table: &str, name: &str) -> Result<Option<String>> {
    Ok(property(row, table, name)?
        .pointer("/select/name")
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn multi_select(row: &DocumentSummary, table: &str, name: &str) -> Result<Vec<String>> {
    Ok(property(row, table, name)?
        .get("multi_select")
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

/// Columns providing each row's page cover and icon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverIconColumns {
    pub cover: Option<String>,
    pub icon: Option<String>,
}

impl CoverIconColumns {
    pub fn from_rows(rows: &[DocumentSummary]) -> Result<Self> {
        const TABLE: &str = "cover & icon";
        let mut columns = Self::default();
        for row in rows {
            let column = title(row, TABLE, "Column name")?;
            match select(row, TABLE, "Select")?.as_deref() {
                Some("cover") => columns.cover = Some(column),
                Some("icon") => columns.icon = Some(column),
                other => {
                    return Err(SyncError::malformed(
                        TABLE,
                        format!("unknown selection {other:?} in row {}", row.id),
                    ));
                }
            }
        }
        Ok(columns)
    }

    /// Cover and icon for one row, falling back to the template's own.
    ///
    /// A short icon value (at most two characters) is an emoji; anything
    /// longer is a custom emoji id.
    pub fn resolve(
        &self,
        row: &Row,
        default_cover: Option<&Cover>,
        default_icon: Option<&Icon>,
    ) -> (Option<Cover>, Option<Icon>) {
        let cell = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|c| row.text(c))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cover = cell(&self.cover)
            .map(Cover::external)
            .or_else(|| default_cover.cloned());
        let icon = cell(&self.icon)
            .map(|value| {
                if value.chars().count() <= 2 {
                    Icon::emoji(value)
                } else {
                    Icon::custom_emoji(value)
                }
            })
            .or_else(|| match default_icon {
                Some(icon @ (Icon::Emoji { .. } | Icon::CustomEmoji { .. })) => Some(icon.clone()),
                _ => None,
            });
        (cover, icon)
    }
}

/// Block variable rows: `Block number`, `Column name`, `Type` (style flags).
pub fn block_var_bindings(rows: &[DocumentSummary]) -> Result<Vec<BlockVarBinding>> {
    const TABLE: &str = "block variables";
    rows.iter()
        .map(|row| {
            let index = property(row, TABLE, "Block number")?
                .get("number")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    SyncError::malformed(TABLE, format!("row {} has no block number", row.id))
                })?;
            let column = title(row, TABLE, "Column name")?;
            let styles = multi_select(row, TABLE, "Type")?;
            let has = |style: &str| styles.iter().any(|s| s == style);
            Ok(BlockVarBinding::new(index, column).styled(Annotations::styled(
                has("bold"),
                has("italic"),
                has("underline"),
                has("strikethrough"),
            )))
        })
        .collect()
}

/// Property mapping rows: `Property name` (rich text) and `Column name` (title).
///
/// The property type comes from the destination schema. A `number` property
/// can only be fed from a numeric column.
pub fn property_bindings(
    rows: &[DocumentSummary],
    schema: &DatabaseSchema,
    sheet: &Sheet,
) -> Result<Vec<PropertyBinding>> {
    const TABLE: &str = "property columns";
    rows.iter()
        .map(|row| {
            let property = rich_text(row, TABLE, "Property name")?;
            let column = title(row, TABLE, "Column name")?;
            let property_schema = schema.get(&property).ok_or_else(|| {
                SyncError::malformed(TABLE, format!("destination has no property {property:?}"))
            })?;
            let column_type = sheet
                .column_type(&column)
                .ok_or_else(|| SyncError::MissingColumn(column.clone()))?;
            if property_schema.ty == "number" && column_type != ColumnType::Number {
                return Err(SyncError::TypeMismatch {
                    property,
                    property_type: property_schema.ty.clone(),
                    column,
                    column_type: "text".to_string(),
                });
            }
            Ok(PropertyBinding {
                property,
                column,
                schema: property_schema.clone(),
            })
        })
        .collect()
}

/// Filter rows: `Is Active`, `Name`, `Column | Property`, `Filter`.
///
/// Inactive rows are skipped. Property clauses take their value type from
/// the destination schema, column clauses from the inferred column type.
pub fn filter_clauses(
    rows: &[DocumentSummary],
    schema: &DatabaseSchema,
    sheet: &Sheet,
) -> Result<Vec<FilterClause>> {
    const TABLE: &str = "filters";
    let mut clauses = Vec::new();
    for row in rows {
        if select(row, TABLE, "Is Active")?.as_deref() != Some("Active") {
            continue;
        }
        let name = title(row, TABLE, "Name")?;
        let expression = rich_text(row, TABLE, "Filter")?;
        let (target, value_type) = match select(row, TABLE, "Column | Property")?.as_deref() {
            Some("Column") => {
                let ty = sheet
                    .column_type(&name)
                    .ok_or_else(|| SyncError::MissingColumn(name.clone()))?;
                let ty = match ty {
                    ColumnType::Number => "number",
                    ColumnType::Text => "text",
                };
                (FilterTarget::Column, ty.to_string())
            }
            Some("Property") => {
                let ty = schema.get(&name).map(|p| p.ty.clone()).ok_or_else(|| {
                    SyncError::malformed(TABLE, format!("destination has no property {name:?}"))
                })?;
                (FilterTarget::Property, ty)
            }
            other => {
                return Err(SyncError::malformed(
                    TABLE,
                    format!("unknown target {other:?} in row {}", row.id),
                ));
            }
        };
        clauses.push(FilterClause {
            target,
            name,
            value_type,
            expression,
        });
    }
    Ok(clauses)
}

/// Pre-process rows: `Column` (title), `Type` (select), `AI` (checkbox).
pub fn pre_process_rules(rows: &[DocumentSummary]) -> Result<Vec<PreProcessRule>> {
    const TABLE: &str = "pre-process";
    rows.iter()
        .map(|row| {
            let column = title(row, TABLE, "Column")?;
            let kind = select(row, TABLE, "Type")?
                .map(|t| PreProcessKind::from_name(&t))
                .unwrap_or(PreProcessKind::Keep);
            let ai = property(row, TABLE, "AI")?
                .get("checkbox")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(PreProcessRule { column, kind, ai })
        })
        .collect()
}

/// Scope values on a template that ask for every remaining column to be
/// rewritten.
const WHOLE_ROW_SCOPES: [&str; 2] = ["全体", "all"];

/// Pre-process rules plus the template's rewrite scope.
///
/// The scope is a `select` or `rich_text` property of the template page; a
/// value of `全体` or `all` rewrites every text column without a rule.
pub fn pre_process_plan(
    template: &DocumentSummary,
    scope_property: &str,
    rows: &[DocumentSummary],
) -> Result<PreProcessPlan> {
    let scope = template
        .property(scope_property)
        .map(|value| match value.pointer("/select/name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => text_of(value, "rich_text"),
        })
        .unwrap_or_default();
    let scope = scope.trim();
    Ok(PreProcessPlan {
        rules: pre_process_rules(rows)?,
        rewrite_remaining: WHOLE_ROW_SCOPES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scope)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;
    use crate::store::PropertySchema;
    use crate::tests::settings_row;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn title_value(text: &str) -> Value {
        json!({"type": "title", "title": [{"type": "text", "text": {"content": text}}]})
    }

    fn rich_value(text: &str) -> Value {
        json!({"type": "rich_text", "rich_text": [{"type": "text", "text": {"content": text}}]})
    }

    fn select_value(name: &str) -> Value {
        json!({"type": "select", "select": {"name": name}})
    }

    fn sheet() -> Sheet {
        let rows = vec![
            [("title", Scalar::from("A")), ("score", Scalar::Int(3))]
                .into_iter()
                .collect(),
        ];
        Sheet::from_rows(vec!["title".into(), "score".into()], rows)
    }

    fn schema() -> DatabaseSchema {
        let mut schema = DatabaseSchema::default();
        schema
            .properties
            .insert("Name".into(), PropertySchema::new("title"));
        schema
            .properties
            .insert("Score".into(), PropertySchema::new("number"));
        schema.properties.insert(
            "Tags".into(),
            PropertySchema::new("multi_select").with_options(["a", "b"]),
        );
        schema
    }

    #[test]
    fn block_vars_read_style_flags() {
        let rows = vec![settings_row(
            "r1",
            [
                ("Block number", json!({"type": "number", "number": 2})),
                ("Column name", title_value("title")),
                (
                    "Type",
                    json!({"type": "multi_select", "multi_select": [{"name": "bold"}, {"name": "underline"}]}),
                ),
            ],
        )];

        let bindings = block_var_bindings(&rows).unwrap();

        assert_eq!(
            bindings,
            vec![BlockVarBinding::new(2, "title")
                .styled(Annotations::styled(true, false, true, false))]
        );
    }

    #[test]
    fn number_property_needs_numeric_column() {
        let rows = vec![settings_row(
            "r1",
            [
                ("Property name", rich_value("Score")),
                ("Column name", title_value("title")),
            ],
        )];

        let err = property_bindings(&rows, &schema(), &sheet()).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { ref property, .. } if property == "Score"));

        let rows = vec![settings_row(
            "r1",
            [
                ("Property name", rich_value("Score")),
                ("Column name", title_value("score")),
            ],
        )];
        let bindings = property_bindings(&rows, &schema(), &sheet()).unwrap();
        assert_eq!(bindings[0].schema.ty, "number");
    }

    #[test]
    fn filters_skip_inactive_rows_and_type_targets() {
        let row = |id: &str, active: &str, name: &str, target: &str, filter: &str| {
            settings_row(
                id,
                [
                    ("Is Active", select_value(active)),
                    ("Name", title_value(name)),
                    ("Column | Property", select_value(target)),
                    ("Filter", rich_value(filter)),
                ],
            )
        };
        let rows = vec![
            row("1", "Active", "score", "Column", ">= 2"),
            row("2", "Inactive", "title", "Column", "= x"),
            row("3", "Active", "Tags", "Property", "in [a]"),
        ];

        let clauses = filter_clauses(&rows, &schema(), &sheet()).unwrap();

        assert_eq!(
            clauses,
            vec![
                FilterClause {
                    target: FilterTarget::Column,
                    name: "score".into(),
                    value_type: "number".into(),
                    expression: ">= 2".into(),
                },
                FilterClause {
                    target: FilterTarget::Property,
                    name: "Tags".into(),
                    value_type: "multi_select".into(),
                    expression: "in [a]".into(),
                },
            ]
        );
    }

    #[test]
    fn cover_icon_rows_and_resolution() {
        let rows = vec![
            settings_row(
                "1",
                [("Select", select_value("cover")), ("Column name", title_value("img"))],
            ),
            settings_row(
                "2",
                [("Select", select_value("icon")), ("Column name", title_value("emoji"))],
            ),
        ];
        let columns = CoverIconColumns::from_rows(&rows).unwrap();
        assert_eq!(columns.cover.as_deref(), Some("img"));

        let row: Row = [("img", "https://img.test/a.png"), ("emoji", "🎯")]
            .into_iter()
            .collect();
        let (cover, icon) = columns.resolve(&row, None, None);
        assert_eq!(cover, Some(Cover::external("https://img.test/a.png")));
        assert_eq!(icon, Some(Icon::emoji("🎯")));

        let row: Row = [("img", ""), ("emoji", "a1b2c3")].into_iter().collect();
        let fallback = Cover::external("https://img.test/default.png");
        let (cover, icon) = columns.resolve(&row, Some(&fallback), None);
        assert_eq!(cover, Some(fallback));
        assert_eq!(icon, Some(Icon::custom_emoji("a1b2c3")));
    }

    #[test]
    fn pre_process_rows() {
        let rows = vec![settings_row(
            "1",
            [
                ("Column", title_value("body")),
                ("Type", select_value("numbered_list")),
                ("AI", json!({"type": "checkbox", "checkbox": true})),
            ],
        )];

        assert_eq!(
            pre_process_rules(&rows).unwrap(),
            vec![PreProcessRule {
                column: "body".into(),
                kind: PreProcessKind::NumberedList,
                ai: true,
            }]
        );
    }

    #[test]
    fn empty_title_is_malformed() {
        let rows = vec![settings_row(
            "r9",
            [
                ("Column", title_value("  ")),
                ("Type", select_value("int")),
                ("AI", json!({"checkbox": false})),
            ],
        )];
        let err = pre_process_rules(&rows).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
    }

    #[rstest]
    #[case(json!({"select": {"name": "全体"}}), true)]
    #[case(json!({"select": {"name": "All"}}), true)]
    #[case(json!({"rich_text": [{"type": "text", "text": {"content": " all "}}]}), true)]
    #[case(json!({"select": {"name": "Columns"}}), false)]
    #[case(json!({"select": null}), false)]
    fn whole_row_scope(#[case] scope: Value, #[case] expected: bool) {
        let template = settings_row("tpl", [("Pre Process", scope)]);
        let plan = pre_process_plan(&template, "Pre Process", &[]).unwrap();
        assert_eq!(plan.rewrite_remaining, expected);
        assert!(plan.rules.is_empty());
    }

    #[test]
    fn missing_scope_property_rewrites_nothing() {
        let template = settings_row("tpl", []);
        assert!(!pre_process_plan(&template, "Pre Process", &[]).unwrap().rewrite_remaining);
    }
}
