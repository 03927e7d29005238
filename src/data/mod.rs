// Collective data - reference data shared by every listening session in the process
// Writes only ever merge, so two sessions racing on the same key end up with the union

use crate::music::ArtistId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Dataset holding artist id -> ids of artists with similar taste.
pub const SIMILAR_ARTISTS: &str = "SimilarArtists";

/// A value that can absorb another value with the same id.
pub trait Mergeable {
    /// Returns false when `other` could not be merged in.
    fn merge(&mut self, other: Self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistSet {
    pub artist_id: ArtistId,
    pub similar: HashSet<ArtistId>,
}

impl ArtistSet {
    pub fn new(artist_id: ArtistId, similar: impl IntoIterator<Item = ArtistId>) -> Self {
        Self {
            artist_id,
            similar: similar.into_iter().collect(),
        }
    }
}

impl Mergeable for ArtistSet {
    fn merge(&mut self, other: Self) -> bool {
        self.similar.extend(other.similar);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectiveValue {
    SimilarArtists(ArtistSet),
}

impl CollectiveValue {
    pub fn id(&self) -> &str {
        match self {
            CollectiveValue::SimilarArtists(set) => set.artist_id.as_str(),
        }
    }
}

impl Mergeable for CollectiveValue {
    fn merge(&mut self, other: Self) -> bool {
        match (self, other) {
            (CollectiveValue::SimilarArtists(mine), CollectiveValue::SimilarArtists(theirs)) => {
                mine.merge(theirs)
            }
        }
    }
}

/// One named dataset: value id -> value.
#[derive(Debug, Clone, Default)]
pub struct CollectiveData {
    id: String,
    values: HashMap<String, CollectiveValue>,
}

impl CollectiveData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, value_id: &str) -> Option<&CollectiveValue> {
        self.values.get(value_id)
    }

    /// Inserts when absent, merges into the stored value otherwise.
    pub fn put(&mut self, value: CollectiveValue) -> bool {
        match self.values.get_mut(value.id()) {
            Some(stored) => stored.merge(value),
            None => {
                self.values.insert(value.id().to_string(), value);
                true
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectiveDataStore {
    datasets: RwLock<HashMap<String, CollectiveData>>,
}

impl CollectiveDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with every dataset the built-in features need.
    pub fn with_default_datasets() -> Self {
        let store = Self::new();
        store.set(CollectiveData::new(SIMILAR_ARTISTS));
        store
    }

    pub fn get(&self, dataset_id: &str, value_id: &str) -> Option<CollectiveValue> {
        self.datasets
            .read()
            .get(dataset_id)
            .and_then(|data| data.get(value_id))
            .cloned()
    }

    /// Returns false if the dataset was never registered.
    pub fn put(&self, dataset_id: &str, value: CollectiveValue) -> bool {
        let mut datasets = self.datasets.write();
        match datasets.get_mut(dataset_id) {
            Some(data) => data.put(value),
            None => {
                warn!("Dropping value '{}' for unregistered dataset '{}'", value.id(), dataset_id);
                false
            }
        }
    }

    /// Installs a whole dataset, replacing any dataset with the same id.
    pub fn set(&self, data: CollectiveData) {
        debug!("Installing dataset '{}' ({} values)", data.id(), data.len());
        self.datasets.write().insert(data.id().to_string(), data);
    }

    pub fn similar_artists(&self, artist_id: &ArtistId) -> Option<HashSet<ArtistId>> {
        match self.get(SIMILAR_ARTISTS, artist_id.as_str())? {
            CollectiveValue::SimilarArtists(set) => Some(set.similar),
        }
    }

    pub fn merge_similar_artists(
        &self,
        artist_id: &ArtistId,
        similar: impl IntoIterator<Item = ArtistId>,
    ) -> bool {
        let value = CollectiveValue::SimilarArtists(ArtistSet::new(artist_id.clone(), similar));
        self.put(SIMILAR_ARTISTS, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ids(raw: &[&str]) -> Vec<ArtistId> {
        raw.iter().map(|id| ArtistId::new(*id)).collect()
    }

    #[test]
    fn test_get_from_missing_dataset() {
        let store = CollectiveDataStore::new();
        assert!(store.get(SIMILAR_ARTISTS, "artist").is_none());
    }

    #[test]
    fn test_put_into_missing_dataset_is_rejected() {
        let store = CollectiveDataStore::new();
        assert!(!store.merge_similar_artists(&ArtistId::new("a"), ids(&["b"])));
        assert!(store.similar_artists(&ArtistId::new("a")).is_none());
    }

    #[test]
    fn test_put_inserts_then_merges() {
        let store = CollectiveDataStore::with_default_datasets();
        let artist = ArtistId::new("a");

        assert!(store.merge_similar_artists(&artist, ids(&["b", "c"])));
        assert!(store.merge_similar_artists(&artist, ids(&["c", "d"])));

        let similar = store.similar_artists(&artist).unwrap();
        assert_eq!(similar, ids(&["b", "c", "d"]).into_iter().collect());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let first = CollectiveDataStore::with_default_datasets();
        let second = CollectiveDataStore::with_default_datasets();
        let artist = ArtistId::new("a");

        first.merge_similar_artists(&artist, ids(&["x", "y"]));
        first.merge_similar_artists(&artist, ids(&["y", "z"]));
        second.merge_similar_artists(&artist, ids(&["y", "z"]));
        second.merge_similar_artists(&artist, ids(&["x", "y"]));

        assert_eq!(first.similar_artists(&artist), second.similar_artists(&artist));
    }

    #[test]
    fn test_set_replaces_dataset() {
        let store = CollectiveDataStore::with_default_datasets();
        let artist = ArtistId::new("a");
        store.merge_similar_artists(&artist, ids(&["b"]));

        store.set(CollectiveData::new(SIMILAR_ARTISTS));
        assert!(store.similar_artists(&artist).is_none());
    }

    #[test]
    fn test_concurrent_merges_keep_union() {
        let store = Arc::new(CollectiveDataStore::with_default_datasets());
        let artist = ArtistId::new("shared");

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                let artist = artist.clone();
                std::thread::spawn(move || {
                    store.merge_similar_artists(&artist, vec![ArtistId::new(format!("similar-{}", n))]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.similar_artists(&artist).unwrap().len(), 8);
    }
}
