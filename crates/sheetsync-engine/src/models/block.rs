use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::rich_text::InlineSpan;

/// Text/background color of a block. Unknown names decode as `Default`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Gray,
    Brown,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Red,
    GrayBackground,
    BrownBackground,
    OrangeBackground,
    YellowBackground,
    GreenBackground,
    BlueBackground,
    PurpleBackground,
    PinkBackground,
    RedBackground,
    #[default]
    #[serde(other)]
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    /// Only levels 1 to 3 exist in the destination store.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::H1),
            2 => Some(Self::H2),
            3 => Some(Self::H3),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::H1 => "heading_1",
            Self::H2 => "heading_2",
            Self::H3 => "heading_3",
        }
    }
}

/// Page or callout icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    Emoji { emoji: String },
    CustomEmoji { custom_emoji: CustomEmojiRef },
    External { external: ExternalUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEmojiRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrl {
    pub url: String,
}

impl Icon {
    pub fn emoji(emoji: impl Into<String>) -> Self {
        Self::Emoji {
            emoji: emoji.into(),
        }
    }

    pub fn custom_emoji(id: impl Into<String>) -> Self {
        Self::CustomEmoji {
            custom_emoji: CustomEmojiRef { id: id.into() },
        }
    }

    pub fn as_emoji(&self) -> Option<&str> {
        match self {
            Self::Emoji { emoji } => Some(emoji),
            _ => None,
        }
    }
}

/// Page cover. Only external covers can be set through the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cover {
    External { external: ExternalUrl },
}

impl Cover {
    pub fn external(url: impl Into<String>) -> Self {
        Self::External {
            external: ExternalUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
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
    Divider,
    BulletedListItem {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    NumberedListItem {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    Quote {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    Callout {
        rich_text: Vec<InlineSpan>,
        icon: Option<Icon>,
        color: Color,
    },
    Table {
        table_width: usize,
        has_column_header: bool,
        has_row_header: bool,
    },
    TableRow {
        cells: Vec<Vec<InlineSpan>>,
    },
    Equation {
        expression: String,
    },
    Toggle {
        rich_text: Vec<InlineSpan>,
        color: Color,
    },
    ColumnList,
    Column,
}

/// A content block ready to be sent to the document store.
///
/// Blocks are built by the markup parser or the template materializer and
/// serialized straight away, so they carry no store identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn paragraph(rich_text: Vec<InlineSpan>) -> Self {
        Self::new(BlockKind::Paragraph {
            rich_text,
            color: Color::Default,
        })
    }

    pub fn divider() -> Self {
        Self::new(BlockKind::Divider)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            BlockKind::Heading { level, .. } => level.type_name(),
            BlockKind::Paragraph { .. } => "paragraph",
            BlockKind::Divider => "divider",
            BlockKind::BulletedListItem { .. } => "bulleted_list_item",
            BlockKind::NumberedListItem { .. } => "numbered_list_item",
            BlockKind::Quote { .. } => "quote",
            BlockKind::Callout { .. } => "callout",
            BlockKind::Table { .. } => "table",
            BlockKind::TableRow { .. } => "table_row",
            BlockKind::Equation { .. } => "equation",
            BlockKind::Toggle { .. } => "toggle",
            BlockKind::ColumnList => "column_list",
            BlockKind::Column => "column",
        }
    }

    /// The block's own rich text, empty for blocks that have none.
    pub fn rich_text(&self) -> &[InlineSpan] {
        match &self.kind {
            BlockKind::Heading { rich_text, .. }
            | BlockKind::Paragraph { rich_text, .. }
            | BlockKind::BulletedListItem { rich_text, .. }
            | BlockKind::NumberedListItem { rich_text, .. }
            | BlockKind::Quote { rich_text, .. }
            | BlockKind::Callout { rich_text, .. }
            | BlockKind::Toggle { rich_text, .. } => rich_text,
            _ => &[],
        }
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("object", "block")?;
        map.serialize_entry("type", self.type_name())?;
        map.serialize_entry(self.type_name(), &BlockBody(self))?;
        map.end()
    }
}

/// The type-keyed payload of a block: `{"rich_text": .., "color": .., "children": ..}`.
struct BlockBody<'a>(&'a Block);

impl Serialize for BlockBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let block = self.0;
        let mut map = serializer.serialize_map(None)?;
        match &block.kind {
            BlockKind::Heading {
                rich_text,
                color,
                is_toggleable,
                ..
            } => {
                map.serialize_entry("rich_text", rich_text)?;
                map.serialize_entry("color", color)?;
                map.serialize_entry("is_toggleable", is_toggleable)?;
            }
            BlockKind::Paragraph { rich_text, color }
            | BlockKind::BulletedListItem { rich_text, color }
            | BlockKind::NumberedListItem { rich_text, color }
            | BlockKind::Quote { rich_text, color }
            | BlockKind::Toggle { rich_text, color } => {
                map.serialize_entry("rich_text", rich_text)?;
                map.serialize_entry("color", color)?;
            }
            BlockKind::Callout {
                rich_text,
                icon,
                color,
            } => {
                map.serialize_entry("rich_text", rich_text)?;
                map.serialize_entry("icon", icon)?;
                map.serialize_entry("color", color)?;
            }
            BlockKind::Table {
                table_width,
                has_column_header,
                has_row_header,
            } => {
                map.serialize_entry("table_width", table_width)?;
                map.serialize_entry("has_column_header", has_column_header)?;
                map.serialize_entry("has_row_header", has_row_header)?;
            }
            BlockKind::TableRow { cells } => {
                map.serialize_entry("cells", cells)?;
            }
            BlockKind::Equation { expression } => {
                map.serialize_entry("expression", expression)?;
            }
            BlockKind::Divider | BlockKind::ColumnList | BlockKind::Column => {}
        }
        // Tables, column lists and columns must always send their children.
        let children_required = matches!(
            block.kind,
            BlockKind::Table { .. } | BlockKind::ColumnList | BlockKind::Column
        );
        if children_required || !block.children.is_empty() {
            map.serialize_entry("children", &block.children)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn divider_has_empty_body() {
        let value = serde_json::to_value(Block::divider()).unwrap();
        assert_eq!(
            value,
            json!({"object": "block", "type": "divider", "divider": {}})
        );
    }

    #[test]
    fn heading_carries_toggle_flag_and_children() {
        let block = Block::new(BlockKind::Heading {
            level: HeadingLevel::H2,
            rich_text: vec![InlineSpan::plain("Title")],
            color: Color::BlueBackground,
            is_toggleable: true,
        })
        .with_children(vec![Block::divider()]);

        let value = serde_json::to_value(&block).unwrap();

        assert_eq!(value["type"], "heading_2");
        assert_eq!(value["heading_2"]["color"], "blue_background");
        assert_eq!(value["heading_2"]["is_toggleable"], true);
        assert_eq!(value["heading_2"]["children"][0]["type"], "divider");
    }

    #[test]
    fn column_list_always_sends_children() {
        let value = serde_json::to_value(Block::new(BlockKind::ColumnList)).unwrap();
        assert_eq!(value["column_list"]["children"], json!([]));
    }

    #[test]
    fn unknown_color_decodes_as_default() {
        let color: Color = serde_json::from_value(json!("sparkly")).unwrap();
        assert_eq!(color, Color::Default);
    }

    #[test]
    fn icons_round_trip_through_store_shape() {
        let icon: Icon =
            serde_json::from_value(json!({"type": "custom_emoji", "custom_emoji": {"id": "x1"}}))
                .unwrap();
        assert_eq!(icon, Icon::custom_emoji("x1"));
        assert_eq!(
            serde_json::to_value(Icon::emoji("⭐")).unwrap(),
            json!({"type": "emoji", "emoji": "⭐"})
        );
    }

    #[test]
    fn heading_levels_stop_at_three() {
        assert_eq!(HeadingLevel::from_level(3), Some(HeadingLevel::H3));
        assert_eq!(HeadingLevel::from_level(4), None);
    }
}
