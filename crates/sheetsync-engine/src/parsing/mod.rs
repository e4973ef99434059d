//! Markup parsing: markdown-like cell text into rich text and blocks.
//!
//! - **`inline`**: text into styled [`InlineSpan`](crate::models::InlineSpan)s
//! - **`blocks`**: text into [`Block`](crate::models::Block)s, built on the inline collector
//! - **`math`**: LaTeX environment lifting applied before block parsing

pub mod blocks;
pub mod inline;
pub mod math;

pub use blocks::{parse_blocks, parse_one_block};
pub use inline::{markdown_options, parse_inline, tokenize};
