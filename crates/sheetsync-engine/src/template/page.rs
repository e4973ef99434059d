use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::block_var::{BlockVarTable, is_block_var};
use super::decode::{RawBlockHeader, TemplateBlock, TemplateKind, decode_kind};
use super::materialize::materialize_all;
use crate::error::{Result, SyncError};
use crate::models::{Block, Row};
use crate::store::DocumentStore;

/// Titles and marker that structure a template page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLayout {
    /// Icon of the callout separating settings from template blocks.
    pub marker_emoji: String,
    pub cover_icon: String,
    pub block_vars: String,
    pub property_columns: String,
    pub filters: String,
    pub pre_process: String,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            marker_emoji: "📋".to_string(),
            cover_icon: "cover & icon".to_string(),
            block_vars: "Block Var & Column Name".to_string(),
            property_columns: "DB Property & Column Name".to_string(),
            filters: "Filters".to_string(),
            pre_process: "Pre Process".to_string(),
        }
    }
}

/// Ids of the settings databases embedded above the marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsDatabases {
    pub cover_icon: Option<String>,
    pub block_vars: Option<String>,
    pub property_columns: Option<String>,
    pub filters: Option<String>,
    pub pre_process: Option<String>,
}

/// A template page's top-level children, split at the marker callout.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSections {
    pub settings: SettingsDatabases,
    /// Store-native template blocks following the marker.
    pub template_blocks: Vec<Value>,
}

/// Splits a template page's children into settings and template blocks.
pub fn split_page(children: Vec<Value>, layout: &TemplateLayout) -> Result<PageSections> {
    let mut settings = SettingsDatabases::default();
    let mut iter = children.into_iter();

    let mut found_marker = false;
    for raw in iter.by_ref() {
        if is_marker(&raw, &layout.marker_emoji) {
            found_marker = true;
            break;
        }
        let Some(title) = raw.pointer("/child_database/title").and_then(Value::as_str) else {
            continue;
        };
        let Some(id) = raw.get("id").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let slot = if title == layout.cover_icon {
            &mut settings.cover_icon
        } else if title == layout.block_vars {
            &mut settings.block_vars
        } else if title == layout.property_columns {
            &mut settings.property_columns
        } else if title == layout.filters {
            &mut settings.filters
        } else if title == layout.pre_process {
            &mut settings.pre_process
        } else {
            log::debug!("Ignoring settings database {title:?}");
            continue;
        };
        *slot = Some(id);
    }

    if !found_marker {
        return Err(SyncError::MissingTemplateMarker);
    }
    Ok(PageSections {
        settings,
        template_blocks: iter.collect(),
    })
}

fn is_marker(raw: &Value, marker_emoji: &str) -> bool {
    raw.get("type").and_then(Value::as_str) == Some("callout")
        && raw.pointer("/callout/icon/emoji").and_then(Value::as_str) == Some(marker_emoji)
}

/// The fully fetched block tree of a template.
///
/// Loaded once per template and shared read-only; materializing rows
/// against it makes no store calls.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateTree {
    blocks: Arc<[TemplateBlock]>,
}

impl TemplateTree {
    pub fn new(blocks: Vec<TemplateBlock>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }

    /// Decodes `top_level` and fetches every nested child from the store.
    ///
    /// Any unsupported block type anywhere in the tree fails the load.
    pub fn load<S: DocumentStore + ?Sized>(store: &S, top_level: &[Value]) -> Result<Self> {
        let blocks = top_level
            .iter()
            .map(|raw| load_block(store, raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(blocks))
    }

    pub fn blocks(&self) -> &[TemplateBlock] {
        &self.blocks
    }

    /// Checks that every block variable in the tree has a binding.
    pub fn check_bindings(&self, bindings: &BlockVarTable) -> Result<()> {
        fn walk(blocks: &[TemplateBlock], bindings: &BlockVarTable) -> Result<()> {
            for block in blocks {
                if let Some(index) = rich_text(&block.kind).and_then(is_block_var) {
                    bindings.binding(index)?;
                }
                walk(&block.children, bindings)?;
            }
            Ok(())
        }
        walk(&self.blocks, bindings)
    }

    /// The page content for one row.
    pub fn render(&self, row: &Row, bindings: &BlockVarTable) -> Result<Vec<Block>> {
        materialize_all(&self.blocks, row, bindings)
    }
}

fn rich_text(kind: &TemplateKind) -> Option<&[crate::models::InlineSpan]> {
    match kind {
        TemplateKind::Callout { rich_text, .. }
        | TemplateKind::Heading { rich_text, .. }
        | TemplateKind::Paragraph { rich_text, .. }
        | TemplateKind::Toggle { rich_text, .. } => Some(rich_text),
        _ => None,
    }
}

fn load_block<S: DocumentStore + ?Sized>(store: &S, raw: &Value) -> Result<TemplateBlock> {
    let header = RawBlockHeader::read(raw)?;
    let kind = decode_kind(raw, &header)?;
    let children = if header.has_children {
        store
            .get_block_children(&header.id)?
            .iter()
            .map(|child| load_block(store, child))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(TemplateBlock {
        id: header.id,
        kind,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sheet, plain_text};
    use crate::template::block_var::BlockVarBinding;
    use crate::tests::{FakeStore, raw_block, raw_child_database, raw_marker};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn settings_come_before_the_marker() {
        let layout = TemplateLayout::default();
        let children = vec![
            raw_child_database("db-vars", "Block Var & Column Name"),
            raw_child_database("db-other", "Notes"),
            raw_child_database("db-filters", "Filters"),
            raw_marker("m", "📋"),
            raw_block("p1", "paragraph", "BLOCK_1", false),
            raw_child_database("db-late", "cover & icon"),
        ];

        let sections = split_page(children, &layout).unwrap();

        assert_eq!(sections.settings.block_vars.as_deref(), Some("db-vars"));
        assert_eq!(sections.settings.filters.as_deref(), Some("db-filters"));
        assert_eq!(sections.settings.cover_icon, None);
        assert_eq!(sections.template_blocks.len(), 2);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = split_page(vec![raw_block("p", "paragraph", "x", false)], &TemplateLayout::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingTemplateMarker));
    }

    #[test]
    fn tree_fetches_nested_children_once() {
        let store = FakeStore::new();
        store.set_children("t1", vec![raw_block("p1", "paragraph", "BLOCK_1", false)]);
        let top = vec![raw_block("t1", "toggle", "Open me", true)];

        let tree = TemplateTree::load(&store, &top).unwrap();

        assert_eq!(tree.blocks().len(), 1);
        assert_eq!(tree.blocks()[0].children.len(), 1);
        assert_eq!(store.children_calls(), 1);

        let sheet = Sheet::from_rows(vec!["c".into()], vec![]);
        let bindings = BlockVarTable::new(vec![BlockVarBinding::new(1, "c")], &sheet).unwrap();
        let row: Row = [("c", "hello")].into_iter().collect();
        let blocks = tree.render(&row, &bindings).unwrap();
        assert_eq!(plain_text(blocks[0].children[0].rich_text()), "hello");
        assert_eq!(store.children_calls(), 1);
    }

    #[test]
    fn unsupported_nested_block_fails_the_load() {
        let store = FakeStore::new();
        store.set_children(
            "t1",
            vec![json!({"id": "img", "type": "image", "has_children": false, "image": {}})],
        );
        let top = vec![raw_block("t1", "toggle", "x", true)];

        let err = TemplateTree::load(&store, &top).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedTemplateBlock(t) if t == "image"));
    }

    #[test]
    fn unbound_variables_are_found_at_load() {
        let tree = TemplateTree::new(vec![TemplateBlock {
            id: "p".into(),
            kind: TemplateKind::Paragraph {
                rich_text: vec![crate::models::InlineSpan::plain("BLOCK_4")],
                color: Default::default(),
            },
            children: vec![],
        }]);

        let err = tree.check_bindings(&BlockVarTable::default()).unwrap_err();
        assert!(matches!(err, SyncError::UnboundBlockVariable(4)));
    }
}
