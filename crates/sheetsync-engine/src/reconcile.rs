//! Deciding which order keys to create, keep and archive.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::OrderKey;
use crate::store::{DocumentId, DocumentStore, DocumentSummary};

pub type OrderKeySet = BTreeSet<OrderKey>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderKeySets {
    /// Keys to (re)build from the source.
    pub common: OrderKeySet,
    /// Keys of the filtered source rows.
    pub source: OrderKeySet,
    /// Keys of the filtered destination documents.
    pub destination: OrderKeySet,
}

impl OrderKeySets {
    /// Destination keys that will not be rebuilt, in ascending order.
    pub fn stale(&self) -> impl Iterator<Item = OrderKey> + '_ {
        self.destination.difference(&self.common).copied()
    }

    /// Drops every key `<= resume_from` from all three sets.
    pub fn resume_after(mut self, resume_from: OrderKey) -> Self {
        for set in [&mut self.common, &mut self.source, &mut self.destination] {
            set.retain(|k| *k > resume_from);
        }
        self
    }
}

/// Reconciles source and destination order keys.
///
/// The destination may lag the source: keys past the destination's current
/// length are treated as still to be created, never as stale.
pub fn reconcile(
    source: &OrderKeySet,
    destination: &OrderKeySet,
    source_count: usize,
    destination_count: usize,
) -> OrderKeySets {
    let eligible: OrderKeySet = if destination_count >= source_count {
        destination
            .iter()
            .copied()
            .filter(|k| (*k as usize) <= source_count)
            .collect()
    } else {
        let first = key_from_count(destination_count + 1);
        let last = key_from_count(source_count);
        destination.iter().copied().chain(first..=last).collect()
    };

    let common: OrderKeySet = eligible.intersection(source).copied().collect();
    log::info!(
        "Reconciled order keys: {} source, {} destination, {} to build",
        source.len(),
        destination.len(),
        common.len()
    );
    OrderKeySets {
        common,
        source: source.clone(),
        destination: destination.clone(),
    }
}

fn key_from_count(count: usize) -> OrderKey {
    OrderKey::try_from(count).unwrap_or(OrderKey::MAX)
}

/// Destination documents by order key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationIndex {
    by_order: BTreeMap<OrderKey, DocumentId>,
}

impl DestinationIndex {
    /// Indexes documents by their order property. Documents without a
    /// readable key are left out; on duplicates the first one wins.
    pub fn from_documents(documents: &[DocumentSummary], order_property: &str) -> Self {
        let mut by_order = BTreeMap::new();
        for doc in documents {
            match doc.order_key(order_property) {
                Some(key) => {
                    by_order.entry(key).or_insert_with(|| doc.id.clone());
                }
                None => log::warn!("Document {} has no {} value", doc.id, order_property),
            }
        }
        Self { by_order }
    }

    pub fn get(&self, key: OrderKey) -> Option<&str> {
        self.by_order.get(&key).map(String::as_str)
    }

    pub fn keys(&self) -> OrderKeySet {
        self.by_order.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_order.is_empty()
    }
}

/// Archives the destination document of each key.
///
/// A failing key is recorded and the remaining keys are still attempted.
/// Keys without a document are skipped. Returns the failed keys.
pub fn archive_stale<S: DocumentStore + ?Sized>(
    store: &S,
    index: &DestinationIndex,
    keys: impl IntoIterator<Item = OrderKey>,
) -> OrderKeySet {
    let mut failed = OrderKeySet::new();
    for key in keys {
        let Some(id) = index.get(key) else {
            continue;
        };
        match store.archive_page(id) {
            Ok(()) => log::info!("Archived order {key} ({id})"),
            Err(e) => {
                log::warn!("Could not archive order {key} ({id}): {e}");
                failed.insert(key);
            }
        }
    }
    failed
}
