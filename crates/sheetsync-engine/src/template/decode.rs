use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::models::{Color, HeadingLevel, Icon, InlineSpan};

/// A template block as fetched from the store, children included.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateBlock {
    pub id: String,
    pub kind: TemplateKind,
    pub children: Vec<TemplateBlock>,
}

/// The block types a template may contain.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKind {
    Callout {
        rich_text: Vec<InlineSpan>,
        icon: Option<Icon>,
        color: Color,
    },
    Heading {
        level: HeadingLevel,
        rich_text: Vec<InlineSpan>,
        color: Color,
        is_toggleable: bool,
    },
    Paragraph {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    Toggle {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    ColumnList,
    Column,
    Divider,
}

/// Header of a store-native block, before its payload is looked at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawBlockHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub has_children: bool,
}

impl RawBlockHeader {
    pub fn read(raw: &Value) -> Result<Self> {
        Self::deserialize(raw).map_err(|e| SyncError::MalformedBlock(e.to_string()))
    }
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    rich_text: Vec<InlineSpan>,
    #[serde(default)]
    color: Color,
}

#[derive(Deserialize)]
struct CalloutPayload {
    #[serde(default)]
    rich_text: Vec<InlineSpan>,
    #[serde(default)]
    icon: Option<Value>,
    #[serde(default)]
    color: Color,
}

#[derive(Deserialize)]
struct HeadingPayload {
    #[serde(default)]
    rich_text: Vec<InlineSpan>,
    #[serde(default)]
    color: Color,
    #[serde(default)]
    is_toggleable: bool,
}

fn payload<T: for<'de> Deserialize<'de>>(raw: &Value, block_type: &str) -> Result<T> {
    let body = raw
        .get(block_type)
        .ok_or_else(|| SyncError::MalformedBlock(format!("{block_type} block has no body")))?;
    T::deserialize(body).map_err(|e| SyncError::MalformedBlock(format!("{block_type}: {e}")))
}

/// Decodes a block's own content. Children are attached by the caller.
pub fn decode_kind(raw: &Value, header: &RawBlockHeader) -> Result<TemplateKind> {
    let ty = header.block_type.as_str();
    let kind = match ty {
        "paragraph" => {
            let p: TextPayload = payload(raw, ty)?;
            TemplateKind::Paragraph {
                rich_text: p.rich_text,
                color: p.color,
            }
        }
        "toggle" => {
            let p: TextPayload = payload(raw, ty)?;
            TemplateKind::Toggle {
                rich_text: p.rich_text,
                color: p.color,
            }
        }
        "callout" => {
            let p: CalloutPayload = payload(raw, ty)?;
            TemplateKind::Callout {
                rich_text: p.rich_text,
                icon: p.icon.and_then(emoji_icon),
                color: p.color,
            }
        }
        "heading_1" | "heading_2" | "heading_3" => {
            let p: HeadingPayload = payload(raw, ty)?;
            let level = ty
                .strip_prefix("heading_")
                .and_then(|n| n.parse().ok())
                .and_then(HeadingLevel::from_level)
                .ok_or_else(|| SyncError::UnsupportedTemplateBlock(ty.to_string()))?;
            TemplateKind::Heading {
                level,
                rich_text: p.rich_text,
                color: p.color,
                is_toggleable: p.is_toggleable,
            }
        }
        "column_list" => TemplateKind::ColumnList,
        "column" => TemplateKind::Column,
        "divider" => TemplateKind::Divider,
        other => return Err(SyncError::UnsupportedTemplateBlock(other.to_string())),
    };
    Ok(kind)
}

/// Callouts can only be created with plain emoji icons.
fn emoji_icon(raw: Value) -> Option<Icon> {
    match serde_json::from_value::<Icon>(raw) {
        Ok(icon @ Icon::Emoji { .. }) => Some(icon),
        Ok(other) => {
            log::debug!("Dropping non-emoji callout icon {other:?}");
            None
        }
        Err(_) => None,
    }
}
