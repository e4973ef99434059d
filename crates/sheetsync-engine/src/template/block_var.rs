use std::collections::BTreeMap;

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, SyncError};
use crate::models::{Annotations, InlineSpan, Sheet, SpanKind};

static BLOCK_VAR: OnceLock<Regex> = OnceLock::new();

/// Index of the block variable a rich text stands for, if it is one.
///
/// Only a single plain text span whose trimmed content is `BLOCK_<n>` counts.
pub fn is_block_var(rich_text: &[InlineSpan]) -> Option<u32> {
    let [span] = rich_text else {
        return None;
    };
    if span.kind != SpanKind::Text {
        return None;
    }
    let pattern =
        BLOCK_VAR.get_or_init(|| Regex::new(r"^BLOCK_(\d+)$").expect("Invalid block variable regex"));
    pattern.captures(span.content.trim())?[1].parse().ok()
}

/// Where a block variable takes its text from and how it is styled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVarBinding {
    pub index: u32,
    pub column: String,
    pub annotations: Annotations,
}

impl BlockVarBinding {
    pub fn new(index: u32, column: impl Into<String>) -> Self {
        Self {
            index,
            column: column.into(),
            annotations: Annotations::PLAIN,
        }
    }

    pub fn styled(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Validated block variable bindings of one template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockVarTable {
    bindings: BTreeMap<u32, BlockVarBinding>,
}

impl BlockVarTable {
    /// Builds the table, rejecting duplicate indices and columns the sheet lacks.
    pub fn new(bindings: Vec<BlockVarBinding>, sheet: &Sheet) -> Result<Self> {
        let mut table = BTreeMap::new();
        for binding in bindings {
            if !sheet.has_column(&binding.column) {
                return Err(SyncError::MissingColumn(binding.column));
            }
            if table.contains_key(&binding.index) {
                return Err(SyncError::malformed(
                    "block variables",
                    format!("BLOCK_{} is bound twice", binding.index),
                ));
            }
            table.insert(binding.index, binding);
        }
        Ok(Self { bindings: table })
    }

    pub fn get(&self, index: u32) -> Option<&BlockVarBinding> {
        self.bindings.get(&index)
    }

    pub fn binding(&self, index: u32) -> Result<&BlockVarBinding> {
        self.get(index)
            .ok_or(SyncError::UnboundBlockVariable(index))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Columns read by the bindings.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.bindings.values().map(|b| b.column.as_str())
    }
}
