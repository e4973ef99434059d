use pulldown_cmark::{Event, Tag};
use regex::Regex;
use std::sync::OnceLock;

use super::inline::{SpanCollector, is_inline_event, tokenize};
use super::math::lift_environments;
use crate::models::{Annotations, Block, BlockKind, Color, HeadingLevel, Icon, InlineSpan, SpanKind};

static CALLOUT_PREFIX: OnceLock<Regex> = OnceLock::new();

/// Parses markdown-like text into a flat sequence of blocks.
///
/// List items are returned as sibling blocks, one per item, so the caller can
/// splice them into its own children.
pub fn parse_blocks(text: &str, defaults: Annotations) -> Vec<Block> {
    let text = lift_environments(text);
    let tokens = tokenize(&text);
    parse_range(&tokens, defaults)
}

fn parse_range(tokens: &[Event<'_>], defaults: Annotations) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let (parsed, next) = parse_one_block(tokens, index, defaults);
        blocks.extend(parsed);
        index = next;
    }
    blocks
}

/// Parses the block that opens at `tokens[index]`.
///
/// Returns the produced blocks and the index one past the block's closing
/// token. A list produces one block per item. Tokens that do not open a
/// supported block produce nothing and advance the index by one.
pub fn parse_one_block(
    tokens: &[Event<'_>],
    index: usize,
    defaults: Annotations,
) -> (Vec<Block>, usize) {
    let tag = match tokens.get(index) {
        Some(Event::Rule) => return (vec![Block::divider()], index + 1),
        Some(Event::Start(tag)) if is_supported(tag) => tag,
        _ => return (Vec::new(), index + 1),
    };

    let end = closing_index(tokens, index);
    let inner = &tokens[index + 1..end];
    let blocks = match tag {
        Tag::Heading { level, .. } => vec![heading(*level, inner, defaults)],
        Tag::Paragraph => paragraph(inner, defaults).into_iter().collect(),
        Tag::List(start) => list_items(inner, start.is_some(), defaults),
        Tag::BlockQuote(_) => vec![quote_or_callout(inner, defaults)],
        Tag::Table(alignments) => vec![table(inner, alignments.len(), defaults)],
        _ => Vec::new(),
    };
    (blocks, end + 1)
}

fn is_supported(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Heading { .. }
            | Tag::Paragraph
            | Tag::List(_)
            | Tag::BlockQuote(_)
            | Tag::Table(_)
    )
}

/// Index of the token closing the block opened at `open`.
fn closing_index(tokens: &[Event<'_>], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, event) in tokens.iter().enumerate().skip(open) {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    tokens.len().saturating_sub(1)
}

fn collect_spans<'a>(
    events: impl IntoIterator<Item = &'a Event<'a>>,
    defaults: Annotations,
) -> Vec<InlineSpan> {
    let mut collector = SpanCollector::new(defaults);
    for event in events {
        collector.push(event);
    }
    collector.finish()
}

fn heading(
    level: pulldown_cmark::HeadingLevel,
    inner: &[Event<'_>],
    defaults: Annotations,
) -> Block {
    let rich_text = collect_spans(inner, defaults);
    let level = match level {
        pulldown_cmark::HeadingLevel::H1 => Some(HeadingLevel::H1),
        pulldown_cmark::HeadingLevel::H2 => Some(HeadingLevel::H2),
        pulldown_cmark::HeadingLevel::H3 => Some(HeadingLevel::H3),
        _ => None,
    };
    match level {
        Some(level) => Block::new(BlockKind::Heading {
            level,
            rich_text,
            color: Color::Default,
            is_toggleable: false,
        }),
        // The store has no heading below level 3; keep the text.
        None => Block::paragraph(rich_text),
    }
}

fn paragraph(inner: &[Event<'_>], defaults: Annotations) -> Option<Block> {
    let content: Vec<&Event<'_>> = inner
        .iter()
        .filter(|e| !matches!(e, Event::Text(t) if t.trim().is_empty()))
        .collect();
    if let [Event::DisplayMath(expression)] = content.as_slice() {
        return Some(Block::new(BlockKind::Equation {
            expression: expression.trim().to_string(),
        }));
    }

    let spans = collect_spans(inner, defaults);
    (!spans.is_empty()).then(|| Block::paragraph(spans))
}

fn list_items(inner: &[Event<'_>], ordered: bool, defaults: Annotations) -> Vec<Block> {
    let mut items = Vec::new();
    let mut index = 0;
    while index < inner.len() {
        if matches!(inner[index], Event::Start(Tag::Item)) {
            let end = closing_index(inner, index);
            items.push(list_item(&inner[index + 1..end], ordered, defaults));
            index = end + 1;
        } else {
            index += 1;
        }
    }
    items
}

fn list_item(inner: &[Event<'_>], ordered: bool, defaults: Annotations) -> Block {
    // Tight items carry their text directly, loose ones wrap it in a paragraph.
    let (rich_text, rest) = match inner.first() {
        Some(Event::Start(Tag::Paragraph)) => {
            let end = closing_index(inner, 0);
            (collect_spans(&inner[1..end], defaults), &inner[end + 1..])
        }
        _ => {
            let split = inner
                .iter()
                .position(|e| !is_inline_event(e))
                .unwrap_or(inner.len());
            (collect_spans(&inner[..split], defaults), &inner[split..])
        }
    };

    let kind = if ordered {
        BlockKind::NumberedListItem {
            rich_text,
            color: Color::Default,
        }
    } else {
        BlockKind::BulletedListItem {
            rich_text,
            color: Color::Default,
        }
    };
    Block::new(kind).with_children(parse_range(rest, defaults))
}

fn quote_or_callout(inner: &[Event<'_>], defaults: Annotations) -> Block {
    let (mut rich_text, rest) = match inner.first() {
        Some(Event::Start(Tag::Paragraph)) => {
            let end = closing_index(inner, 0);
            (collect_spans(&inner[1..end], defaults), &inner[end + 1..])
        }
        _ => (Vec::new(), inner),
    };
    let children = parse_range(rest, defaults);

    let kind = match take_callout_icon(&mut rich_text) {
        Some(emoji) => BlockKind::Callout {
            rich_text,
            icon: Some(Icon::emoji(emoji)),
            color: Color::Default,
        },
        None => BlockKind::Quote {
            rich_text,
            color: Color::Default,
        },
    };
    Block::new(kind).with_children(children)
}

/// Strips a leading `[!<emoji>]` marker from the first span, returning the emoji.
fn take_callout_icon(rich_text: &mut Vec<InlineSpan>) -> Option<String> {
    let prefix = CALLOUT_PREFIX
        .get_or_init(|| Regex::new(r"^\[!(.*?)\]\s*").expect("Invalid callout regex"));

    let first = rich_text.first_mut()?;
    if first.kind != SpanKind::Text {
        return None;
    }
    let caps = prefix.captures(&first.content)?;
    let emoji = caps[1].to_string();
    let matched = caps[0].len();
    first.content.replace_range(..matched, "");
    if first.content.is_empty() {
        rich_text.remove(0);
    }
    Some(emoji)
}

fn table(inner: &[Event<'_>], column_count: usize, defaults: Annotations) -> Block {
    let mut rows = Vec::new();
    let mut has_column_header = false;
    let mut header_width = None;

    let mut index = 0;
    while index < inner.len() {
        match &inner[index] {
            Event::Start(tag @ (Tag::TableHead | Tag::TableRow)) => {
                let end = closing_index(inner, index);
                let cells = table_cells(&inner[index + 1..end], defaults);
                if matches!(tag, Tag::TableHead) {
                    has_column_header = true;
                    header_width = Some(cells.len());
                }
                rows.push(Block::new(BlockKind::TableRow { cells }));
                index = end + 1;
            }
            _ => index += 1,
        }
    }

    Block::new(BlockKind::Table {
        table_width: header_width.unwrap_or(column_count),
        has_column_header,
        has_row_header: false,
    })
    .with_children(rows)
}

fn table_cells(inner: &[Event<'_>], defaults: Annotations) -> Vec<Vec<InlineSpan>> {
    let mut cells = Vec::new();
    let mut index = 0;
    while index < inner.len() {
        if matches!(inner[index], Event::Start(Tag::TableCell)) {
            let end = closing_index(inner, index);
            cells.push(collect_spans(&inner[index + 1..end], defaults));
            index = end + 1;
        } else {
            index += 1;
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plain_text;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(text: &str) -> Vec<Block> {
        parse_blocks(text, Annotations::PLAIN)
    }

    #[test]
    fn empty_text_has_no_blocks() {
        assert_eq!(parse(""), vec![]);
    }

    #[rstest]
    #[case("# One", HeadingLevel::H1)]
    #[case("## Two", HeadingLevel::H2)]
    #[case("### Three", HeadingLevel::H3)]
    fn headings_keep_their_level(#[case] text: &str, #[case] expected: HeadingLevel) {
        let blocks = parse(text);

        assert_eq!(blocks.len(), 1);
        match &blocks[0].kind {
            BlockKind::Heading { level, .. } => assert_eq!(*level, expected),
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn deep_headings_fall_back_to_paragraphs() {
        let blocks = parse("#### Deep");
        assert_eq!(blocks[0].type_name(), "paragraph");
        assert_eq!(plain_text(blocks[0].rich_text()), "Deep");
    }

    #[test]
    fn rule_is_a_divider() {
        assert_eq!(parse("a\n\n---\n\nb")[1], Block::divider());
    }

    #[test]
    fn bullet_items_are_siblings() {
        let blocks = parse("- a\n- b");

        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.type_name() == "bulleted_list_item"));
        assert_eq!(plain_text(blocks[0].rich_text()), "a");
        assert_eq!(plain_text(blocks[1].rich_text()), "b");
    }

    #[test]
    fn nested_lists_become_children() {
        let blocks = parse("1. first\n   - inner\n     - deeper\n2. second");

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].type_name(), "numbered_list_item");
        let inner = &blocks[0].children;
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].type_name(), "bulleted_list_item");
        assert_eq!(plain_text(inner[0].rich_text()), "inner");
        assert_eq!(plain_text(inner[0].children[0].rich_text()), "deeper");
    }

    #[test]
    fn loose_list_items_use_their_first_paragraph() {
        let blocks = parse("- a\n\n  more\n\n- b");

        assert_eq!(plain_text(blocks[0].rich_text()), "a");
        assert_eq!(blocks[0].children, vec![Block::paragraph(vec![InlineSpan::plain("more")])]);
    }

    #[test]
    fn callout_marker_sets_icon() {
        let blocks = parse("> [!⭐] Remember this\n> and this");

        match &blocks[0].kind {
            BlockKind::Callout { rich_text, icon, .. } => {
                assert_eq!(icon.as_ref().and_then(Icon::as_emoji), Some("⭐"));
                assert_eq!(plain_text(rich_text), "Remember this\nand this");
            }
            other => panic!("expected callout, got {other:?}"),
        }
    }

    #[test]
    fn plain_blockquote_is_a_quote_with_children() {
        let blocks = parse("> said\n>\n> - point");

        assert_eq!(blocks[0].type_name(), "quote");
        assert_eq!(plain_text(blocks[0].rich_text()), "said");
        assert_eq!(blocks[0].children[0].type_name(), "bulleted_list_item");
    }

    #[test]
    fn table_with_header() {
        let blocks = parse("| a | b |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |");

        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].kind,
            BlockKind::Table {
                table_width: 2,
                has_column_header: true,
                has_row_header: false,
            }
        );
        assert_eq!(blocks[0].children.len(), 3);
        match &blocks[0].children[2].kind {
            BlockKind::TableRow { cells } => {
                assert_eq!(cells[0], vec![InlineSpan::plain("3")]);
                assert_eq!(cells[1], vec![InlineSpan::plain("4")]);
            }
            other => panic!("expected row, got {other:?}"),
        }
    }

    #[test]
    fn display_math_paragraph_is_an_equation() {
        let blocks = parse("$$ E = mc^2 $$");
        assert_eq!(
            blocks,
            vec![Block::new(BlockKind::Equation {
                expression: "E = mc^2".into()
            })]
        );
    }

    #[test]
    fn latex_environment_is_kept_verbatim() {
        let blocks = parse("\\begin{cases}\nx & y\n\\end{cases}");
        assert_eq!(
            blocks,
            vec![Block::new(BlockKind::Equation {
                expression: "\\begin{cases}\nx & y\n\\end{cases}".into()
            })]
        );
    }

    #[test]
    fn paragraph_joins_lines_with_newlines() {
        let blocks = parse("line one\nline **two**");

        assert_eq!(
            blocks[0].rich_text(),
            &[
                InlineSpan::plain("line one\nline "),
                InlineSpan::text("two", Annotations::styled(true, false, false, false)),
            ]
        );
    }

    #[test]
    fn defaults_reach_every_block() {
        let italic = Annotations::styled(false, true, false, false);
        let blocks = parse_blocks("# T\n\n- item", italic);

        assert!(blocks[0].rich_text()[0].annotations.italic);
        assert!(blocks[1].rich_text()[0].annotations.italic);
    }

    #[test]
    fn code_blocks_are_skipped() {
        let blocks = parse("before\n\n```\ncode\n```\n\nafter");

        assert_eq!(blocks.len(), 2);
        assert_eq!(plain_text(blocks[0].rich_text()), "before");
        assert_eq!(plain_text(blocks[1].rich_text()), "after");
    }

    #[test]
    fn index_lands_past_the_closing_token() {
        let tokens = tokenize("para\n\n- a\n- b");

        let (first, next) = parse_one_block(&tokens, 0, Annotations::PLAIN);
        assert_eq!(first.len(), 1);
        assert!(matches!(tokens[next - 1], Event::End(_)));
        assert!(matches!(tokens[next], Event::Start(Tag::List(None))));

        let (items, next) = parse_one_block(&tokens, next, Annotations::PLAIN);
        assert_eq!(items.len(), 2);
        assert_eq!(next, tokens.len());
    }

    #[test]
    fn unsupported_opening_token_advances_by_one() {
        let tokens = tokenize("```\nx\n```");
        let (blocks, next) = parse_one_block(&tokens, 0, Annotations::PLAIN);

        assert!(blocks.is_empty());
        assert_eq!(next, 1);
    }
}
