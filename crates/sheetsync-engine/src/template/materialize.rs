use super::block_var::{BlockVarTable, is_block_var};
use super::decode::{TemplateBlock, TemplateKind};
use crate::error::{Result, SyncError};
use crate::models::{Block, BlockKind, InlineSpan, Row};
use crate::parsing::{parse_blocks, parse_inline};

/// Output of materializing one template block.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Single(Block),
    /// A bound paragraph expands into any number of blocks, spliced in place.
    Many(Vec<Block>),
}

impl Materialized {
    pub fn is_multi_block(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    /// Appends a single block, or splices a multi-block result, onto `out`.
    pub fn splice_into(self, out: &mut Vec<Block>) {
        match self {
            Self::Single(block) => out.push(block),
            Self::Many(blocks) => out.extend(blocks),
        }
    }
}

/// Materializes a template block against one row.
pub fn materialize(
    block: &TemplateBlock,
    row: &Row,
    bindings: &BlockVarTable,
) -> Result<Materialized> {
    let single = match &block.kind {
        TemplateKind::Paragraph { rich_text, color } => {
            if let Some(index) = is_block_var(rich_text) {
                let binding = bindings.binding(index)?;
                let text = cell_text(row, &binding.column)?;
                return Ok(Materialized::Many(parse_blocks(&text, binding.annotations)));
            }
            BlockKind::Paragraph {
                rich_text: rich_text.clone(),
                color: *color,
            }
        }
        TemplateKind::Callout {
            rich_text,
            icon,
            color,
        } => BlockKind::Callout {
            rich_text: substitute(rich_text, row, bindings)?,
            icon: icon.clone(),
            color: *color,
        },
        TemplateKind::Heading {
            level,
            rich_text,
            color,
            is_toggleable,
        } => BlockKind::Heading {
            level: *level,
            rich_text: substitute(rich_text, row, bindings)?,
            color: *color,
            is_toggleable: *is_toggleable,
        },
        TemplateKind::Toggle { rich_text, color } => BlockKind::Toggle {
            rich_text: substitute(rich_text, row, bindings)?,
            color: *color,
        },
        TemplateKind::ColumnList => BlockKind::ColumnList,
        TemplateKind::Column => BlockKind::Column,
        TemplateKind::Divider => return Ok(Materialized::Single(Block::divider())),
    };

    let children = materialize_all(&block.children, row, bindings)?;
    Ok(Materialized::Single(Block::new(single).with_children(children)))
}

/// Materializes a sequence of template blocks, splicing multi-block results.
pub fn materialize_all(
    blocks: &[TemplateBlock],
    row: &Row,
    bindings: &BlockVarTable,
) -> Result<Vec<Block>> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        materialize(block, row, bindings)?.splice_into(&mut out);
    }
    Ok(out)
}

fn substitute(
    rich_text: &[InlineSpan],
    row: &Row,
    bindings: &BlockVarTable,
) -> Result<Vec<InlineSpan>> {
    match is_block_var(rich_text) {
        Some(index) => {
            let binding = bindings.binding(index)?;
            let text = cell_text(row, &binding.column)?;
            Ok(parse_inline(&text, binding.annotations))
        }
        None => Ok(rich_text.to_vec()),
    }
}

fn cell_text(row: &Row, column: &str) -> Result<String> {
    row.text(column)
        .ok_or_else(|| SyncError::MissingColumn(column.to_string()))
}
