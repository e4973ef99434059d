//! Template pages: loading, configuration tables and per-row materialization.

pub mod block_var;
pub mod decode;
pub mod materialize;
pub mod page;
pub mod settings;

pub use block_var::{BlockVarBinding, BlockVarTable, is_block_var};
pub use decode::{TemplateBlock, TemplateKind};
pub use materialize::{Materialized, materialize, materialize_all};
pub use page::{PageSections, SettingsDatabases, TemplateLayout, TemplateTree, split_page};
pub use settings::CoverIconColumns;
