pub mod error;
pub mod filter;
pub mod ids;
pub mod models;
pub mod parsing;
pub mod preprocess;
pub mod properties;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod template;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use error::{Result, SyncError, TransportError};
pub use filter::{FilterClause, FilterTarget, create_remote_filter, filter_rows};
pub use ids::extract_database_id;
pub use models::*;
pub use parsing::{parse_blocks, parse_inline, parse_one_block};
pub use reconcile::{OrderKeySets, reconcile};
pub use store::{DocumentStore, RowSource, TextRewriteOracle};
pub use sync::{SyncOptions, SyncReport, Synchronizer, TemplateOutcome};
pub use template::{Materialized, TemplateTree, is_block_var, materialize};
