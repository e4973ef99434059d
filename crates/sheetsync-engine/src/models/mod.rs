pub mod block;
pub mod rich_text;
pub mod row;

pub use block::{Block, BlockKind, Color, Cover, HeadingLevel, Icon};
pub use rich_text::{Annotations, InlineSpan, SpanKind, plain_text};
pub use row::{Column, ColumnType, OrderKey, Row, Scalar, Sheet};
