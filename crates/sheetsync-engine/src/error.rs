/// Failure reported by an external collaborator (document store or rewrite oracle).
///
/// Retrying is the collaborator's business; by the time this reaches the
/// engine the call has failed for good.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed{}: {message}", status_suffix(.status))]
pub struct TransportError {
    pub operation: String,
    pub message: String,
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid filter expression: {0}")]
    InvalidFilterExpression(String),
    #[error("Unsupported template block type: {0}")]
    UnsupportedTemplateBlock(String),
    #[error("Type mismatch: property {property} is {property_type} but column {column} is {column_type}")]
    TypeMismatch {
        property: String,
        property_type: String,
        column: String,
        column_type: String,
    },
    #[error("Value {value:?} is not registered for property {property}")]
    PropertyValueNotRegistered { property: String, value: String },
    #[error("Page creation failed for order {order}: {source}")]
    PageCreation {
        order: u32,
        #[source]
        source: TransportError,
    },
    #[error("Could not write order {order} onto page {page_id}: {source}")]
    OrderIndexUpdate {
        order: u32,
        page_id: String,
        #[source]
        source: TransportError,
    },
    #[error("Block variable BLOCK_{0} has no binding")]
    UnboundBlockVariable(u32),
    #[error("Column not found: {0}")]
    MissingColumn(String),
    #[error("Malformed record in {table}: {reason}")]
    MalformedRecord { table: String, reason: String },
    #[error("Template page has no marker callout")]
    MissingTemplateMarker,
    #[error("Unsupported property type {property_type} for property {property}")]
    UnsupportedPropertyType {
        property: String,
        property_type: String,
    },
    #[error("Malformed block: {0}")]
    MalformedBlock(String),
}

impl SyncError {
    pub(crate) fn malformed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
