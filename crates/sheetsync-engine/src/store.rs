//! Interfaces of the external collaborators the engine drives.
//!
//! The engine never speaks HTTP. A [`DocumentStore`] implementation owns the
//! transport together with its retry and rate-limit policy, and reports
//! failures as [`TransportError`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TransportError};
use crate::models::{Block, Cover, Icon, OrderKey, Sheet};

pub type DocumentId = String;

/// One result row of a database query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub icon: Option<Icon>,
    #[serde(default)]
    pub cover: Option<Cover>,
}

impl DocumentSummary {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Value of a `number` property holding an order key.
    pub fn order_key(&self, property: &str) -> Option<OrderKey> {
        let number = self.property(property)?.get("number")?;
        number
            .as_u64()
            .and_then(|n| OrderKey::try_from(n).ok())
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as OrderKey)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub property: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseQuery {
    pub filter: Option<Value>,
    pub sorts: Vec<Sort>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub results: Vec<DocumentSummary>,
    pub next_cursor: Option<String>,
}

/// Type and registered options of one destination property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub ty: String,
    /// Option names for `select`, `multi_select` and `status`; empty otherwise.
    #[serde(default)]
    pub options: Vec<String>,
}

impl PropertySchema {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|o| o == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub properties: BTreeMap<String, PropertySchema>,
}

impl DatabaseSchema {
    pub fn get(&self, property: &str) -> Option<&PropertySchema> {
        self.properties.get(property)
    }
}

/// Everything needed to create one destination page.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub parent_database: String,
    pub icon: Option<Icon>,
    pub cover: Option<Cover>,
    pub properties: Map<String, Value>,
    pub children: Vec<Block>,
}

pub trait DocumentStore {
    /// One page of query results; pass the returned cursor to continue.
    fn query_database(
        &self,
        database_id: &str,
        query: &DatabaseQuery,
        cursor: Option<&str>,
    ) -> Result<QueryPage, TransportError>;

    /// Children of a block or page, in the store's native JSON shape.
    fn get_block_children(&self, block_id: &str) -> Result<Vec<Value>, TransportError>;

    fn create_page(&self, page: &NewPage) -> Result<DocumentId, TransportError>;

    fn archive_page(&self, document_id: &str) -> Result<(), TransportError>;

    fn restore_page(&self, document_id: &str) -> Result<(), TransportError>;

    fn set_page_property(
        &self,
        document_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), TransportError>;

    fn get_database_schema(&self, database_id: &str) -> Result<DatabaseSchema, TransportError>;
}

/// Drives [`DocumentStore::query_database`] until the cursor runs out.
pub fn fetch_all<S: DocumentStore + ?Sized>(
    store: &S,
    database_id: &str,
    query: &DatabaseQuery,
) -> Result<Vec<DocumentSummary>> {
    let mut documents = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.query_database(database_id, query, cursor.as_deref())?;
        documents.extend(page.results);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    log::debug!("Fetched {} documents from {}", documents.len(), database_id);
    Ok(documents)
}

/// Loads spreadsheet rows from a path or URL, inferring column types.
pub trait RowSource {
    fn load(&self, location: &str) -> Result<Sheet>;
}

/// External text rewriter used by column pre-processing.
pub trait TextRewriteOracle {
    /// Rewrites several texts at once. The response may omit or garble
    /// entries; callers fall back to [`rewrite_one`](Self::rewrite_one).
    fn rewrite_batch(&self, items: &[(usize, String)])
    -> Result<Vec<(usize, String)>, TransportError>;

    fn rewrite_one(&self, text: &str) -> Result<String, TransportError>;
}
