//! Shared fixtures for unit tests: store-native JSON builders and fakes.


pub use fake_store::{FakeRows, FakeStore};

use serde_json::{Map, Value, json};

use crate::store::DocumentSummary;

fn rich_text(text: &str) -> Value {
    json!([{"type": "text", "text": {"content": text}, "plain_text": text}])
}

/// A store-native block with a single plain text run.
pub fn raw_block(id: &str, block_type: &str, text: &str, has_children: bool) -> Value {
    json!({
        "id": id,
        "type": block_type,
        "has_children": has_children,
        (block_type): {"rich_text": rich_text(text), "color": "default"},
    })
}

pub fn raw_child_database(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "type": "child_database",
        "has_children": false,
        "child_database": {"title": title},
    })
}

/// A callout with an emoji icon, as used to mark where template blocks start.
pub fn raw_marker(id: &str, emoji: &str) -> Value {
    json!({
        "id": id,
        "type": "callout",
        "has_children": false,
        "callout": {
            "rich_text": rich_text("Template"),
            "icon": {"type": "emoji", "emoji": emoji},
            "color": "gray_background",
        },
    })
}

/// A row of a settings database.
pub fn settings_row<const N: usize>(id: &str, properties: [(&str, Value); N]) -> DocumentSummary {
    DocumentSummary {
        id: id.to_string(),
        properties: properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Map<_, _>>(),
        icon: None,
        cover: None,
    }
}

/// A template box entry pointing at a destination database and a sheet.
pub fn template_page(id: &str, mention: &str, sheet_url: &str, status: &str) -> DocumentSummary {
    settings_row(
        id,
        [
            (
                "Database Mention",
                json!({"rich_text": [{
                    "type": "mention",
                    "mention": {"type": "database"},
                    "plain_text": "Output",
                    "href": mention,
                }]}),
            ),
            (
                "csv file",
                json!({"files": [{"name": "sheet.csv", "type": "file", "file": {"url": sheet_url}}]}),
            ),
            ("Status", json!({"status": {"name": status}})),
        ],
    )
}
