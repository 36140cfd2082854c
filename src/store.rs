use crate::error::StoreError;
use crate::paths::{CollectionPath, DocPath};
use crate::saving;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A single field value inside a stored document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Replaced by the store's current time when the write is applied
    ServerTimestamp,
}

pub type Fields = BTreeMap<String, FieldValue>;

/// A document as returned by a read: its identifier plus its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(key) {
            Some(FieldValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }
}

/// Hierarchical document database consumed by the tracker.
///
/// Collections and documents alternate along a path
/// (`projects/{id}/sections/{id}/items/{id}`). Deleting a document does not
/// touch its sub-collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document, `None` if it does not exist.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Read every document directly inside a collection, ordered by identifier.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError>;

    /// Create a document with a store-assigned identifier and return it.
    async fn create(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError>;

    /// Overwrite the named fields of an existing document.
    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Remove a document. Removing a missing document is not an error.
    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    /// Create or replace a document at a fixed path.
    async fn set(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;
}

/// Generate a 20 character alphanumeric document identifier.
pub fn generate_document_id() -> String {
    generate_token(20)
}

pub(crate) fn generate_token(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn resolve_server_timestamps(fields: Fields, now: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| match value {
            FieldValue::ServerTimestamp => (key, FieldValue::Timestamp(now)),
            other => (key, other),
        })
        .collect()
}

/// On-disk image of a [`MemoryStore`], keyed by full document path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub documents: BTreeMap<String, Fields>,
}

/// In-process document store, optionally persisted to a compressed snapshot
/// after every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Fields>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading the existing snapshot if any.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let documents = if path.exists() {
            let snapshot = saving::load_snapshot(path)?;
            log::info!(
                "loaded {} documents from {}",
                snapshot.documents.len(),
                path.display()
            );
            snapshot.documents
        } else {
            BTreeMap::new()
        };

        Ok(MemoryStore {
            documents: RwLock::new(documents),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(StoreSnapshot {
            documents: documents.clone(),
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Apply `change` to the documents. With a snapshot file the change is
    /// made on a copy which replaces the live map only once it is on disk.
    fn apply<F>(&self, documents: &mut BTreeMap<String, Fields>, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, Fields>),
    {
        let Some(path) = &self.snapshot_path else {
            change(documents);
            return Ok(());
        };

        let mut snapshot = StoreSnapshot {
            documents: documents.clone(),
        };
        change(&mut snapshot.documents);
        saving::save_snapshot(&snapshot, path)?;
        *documents = snapshot.documents;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.get(&path.to_string()).map(|fields| Document {
            id: path.id().to_string(),
            fields: fields.clone(),
        }))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let prefix = format!("{}/", collection);
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;

        Ok(documents
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, fields)| {
                let id = &key[prefix.len()..];
                // Deeper paths belong to sub-collections
                (!id.contains('/')).then(|| Document {
                    id: id.to_string(),
                    fields: fields.clone(),
                })
            })
            .collect())
    }

    async fn create(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;

        let mut path = collection.doc(&generate_document_id())?;
        while documents.contains_key(&path.to_string()) {
            path = collection.doc(&generate_document_id())?;
        }

        let key = path.to_string();
        let fields = resolve_server_timestamps(fields, Utc::now());
        self.apply(&mut documents, |docs| {
            docs.insert(key, fields);
        })?;

        log::debug!("created {}", path);
        Ok(path.id().to_string())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;

        let key = path.to_string();
        if !documents.contains_key(&key) {
            return Err(StoreError::NotFound(key));
        }
        let fields = resolve_server_timestamps(fields, Utc::now());
        self.apply(&mut documents, |docs| {
            if let Some(existing) = docs.get_mut(&key) {
                existing.extend(fields);
            }
        })?;

        log::debug!("updated {}", path);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;

        let key = path.to_string();
        if documents.contains_key(&key) {
            self.apply(&mut documents, |docs| {
                docs.remove(&key);
            })?;
            log::debug!("deleted {}", path);
        }
        Ok(())
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;

        let key = path.to_string();
        let fields = resolve_server_timestamps(fields, Utc::now());
        self.apply(&mut documents, |docs| {
            docs.insert(key, fields);
        })?;

        log::debug!("set {}", path);
        Ok(())
    }
}
