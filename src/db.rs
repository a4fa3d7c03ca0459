use crate::codec;
use crate::config::{Config, Encoding};
use crate::crypto;
use crate::error::{Result, StoreError};
use crate::index::{self, BTree, RebuildReport, usable_token};
use crate::query::{Conditions, SearchConditions};
use crate::storage::{ChunkInfo, ChunkStore};
use crate::types::{Document, QueryResult, Value};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Field used to key the ordered index.
pub const TOKEN_FIELD: &str = "token";

const ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Outcome of a `create`, carrying the primary key when one is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateReceipt {
    pub primary_key: Option<(String, Value)>,
}

impl CreateReceipt {
    pub fn id(&self) -> Option<&Value> {
        self.primary_key.as_ref().map(|(_, v)| v)
    }
}

/// One side of a configuration conversion. Unset fields fall back to the
/// store's current configuration.
#[derive(Debug, Clone, Default)]
pub struct ConvertTarget {
    pub directory: Option<PathBuf>,
    pub extension: Option<String>,
    pub encryption: Option<crypto::Algorithm>,
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertReport {
    pub converted: usize,
    pub failed: usize,
}

/// The collection store: one instance per storage directory, tying the
/// codec, encryption, chunked file store, token index, and query engine
/// together behind per-collection operations.
pub struct Borealis {
    pub(crate) config: Config,
    store: ChunkStore,
    index: BTree,
}

impl Borealis {
    /// Validate the configuration and open a store rooted at its directory.
    /// The directory is created if missing; collection files appear lazily
    /// on first write.
    pub fn open(config: Config) -> Result<Self> {
        let config = config.normalized()?;
        fs::create_dir_all(&config.directory)?;
        Ok(Self {
            store: ChunkStore::new(config.clone()),
            index: BTree::new(index::ORDER),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Append a document to a collection, assigning the primary key field
    /// when configured and absent. With `no_repeat`, a record deep-equal on
    /// every caller-supplied field is rejected before anything is written.
    pub fn create(&mut self, collection: &str, document: Document) -> Result<CreateReceipt> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        let mut documents = self.read_collection(&path)?;

        if self.config.no_repeat && self.is_duplicate(&documents, &document) {
            return Err(StoreError::Duplicate(
                "record already exists (no_repeat enabled)".to_string(),
            ));
        }

        let mut object = document;
        let mut primary_key = None;
        if let Some(key_field) = self.config.auto_primary_key.clone() {
            if !object.contains_field(&key_field) {
                object.insert(key_field.clone(), self.generate_unique_id());
            }
            primary_key = object.get(&key_field).cloned().map(|v| (key_field, v));
        }

        documents.push(object.clone());
        self.write_collection(&path, documents)?;

        if let Some(token) = object.get(TOKEN_FIELD) {
            if usable_token(token) {
                self.index.insert(token.clone(), object.clone());
            }
        }

        Ok(CreateReceipt { primary_key })
    }

    /// Remove every matching document; returns how many were removed.
    pub fn delete(&self, collection: &str, conditions: &Conditions) -> Result<usize> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "collection '{}'",
                collection
            )));
        }
        let documents = self.read_collection(&path)?;
        let original = documents.len();
        let kept: Vec<Document> = documents
            .into_iter()
            .filter(|d| !conditions.matches(d))
            .collect();
        let removed = original - kept.len();
        self.write_collection(&path, kept)?;
        Ok(removed)
    }

    /// Overwrite the whole collection payload with an arbitrary value.
    pub fn inject(&self, collection: &str, payload: Value) -> Result<()> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        self.store.write(&path, &payload)
    }

    /// All documents matching the conditions, in file order.
    pub fn find(&self, collection: &str, conditions: &Conditions) -> Result<QueryResult> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(QueryResult::default());
        }
        let documents = self.read_collection(&path)?;
        Ok(QueryResult::new(
            documents
                .into_iter()
                .filter(|d| conditions.matches(d))
                .collect(),
        ))
    }

    /// The first matching document, if any.
    pub fn find_one(&self, collection: &str, conditions: &Conditions) -> Result<Option<Document>> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(None);
        }
        let documents = self.read_collection(&path)?;
        Ok(documents.into_iter().find(|d| conditions.matches(d)))
    }

    /// Substring/regex search across fields; see [`SearchConditions`].
    pub fn search(&self, collection: &str, conditions: &SearchConditions) -> Result<QueryResult> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(QueryResult::default());
        }
        let documents = self.read_collection(&path)?;
        Ok(QueryResult::new(
            documents
                .into_iter()
                .filter(|d| conditions.matches(d))
                .collect(),
        ))
    }

    /// Every document in the collection, in file order.
    pub fn get(&self, collection: &str) -> Result<QueryResult> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        Ok(QueryResult::new(self.read_collection(&path)?))
    }

    /// The raw decoded payload, which may not be a document array when the
    /// collection was written through [`inject`](Self::inject).
    pub fn read_data(&self, collection: &str) -> Result<Option<Value>> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        self.store.read(&path)
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.get(collection)?.count())
    }

    /// Whether at least one document matches the conditions.
    pub fn exists(&self, collection: &str, conditions: &Conditions) -> Result<bool> {
        Ok(!self.find(collection, conditions)?.is_empty())
    }

    /// Shallow-merge `patch` into every matching document.
    ///
    /// With `no_repeat`, each merged result is checked against every other
    /// record for deep equality on the patched fields; any collision fails
    /// the whole call with a duplicate error and commits nothing. Returns
    /// the number of documents modified; zero matches is the distinct
    /// [`StoreError::NoMatch`].
    pub fn edit(
        &self,
        collection: &str,
        conditions: &Conditions,
        patch: &Document,
    ) -> Result<usize> {
        validate_name(collection)?;
        if patch.is_empty() {
            return Err(StoreError::Validation(
                "patch must contain at least one field".to_string(),
            ));
        }
        let path = self.collection_path(collection);
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "collection '{}'",
                collection
            )));
        }

        let documents = self.read_collection(&path)?;
        let mut updated = documents.clone();
        let mut modified = 0;

        for i in 0..documents.len() {
            if !conditions.matches(&documents[i]) {
                continue;
            }
            let merged = documents[i].merged(patch);
            if self.config.no_repeat && self.collides(&documents, i, &merged, patch) {
                return Err(StoreError::Duplicate(
                    "edit would create duplicate data (no_repeat enabled)".to_string(),
                ));
            }
            updated[i] = merged;
            modified += 1;
        }

        if modified == 0 {
            return Err(StoreError::NoMatch);
        }
        self.write_collection(&path, updated)?;
        Ok(modified)
    }

    /// Delete a collection's base file and every discoverable chunk file.
    /// Returns how many files were removed.
    pub fn drop_collection(&self, collection: &str) -> Result<usize> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        let removed = self.store.remove_all(&path)?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!(
                "collection '{}'",
                collection
            )));
        }
        Ok(removed)
    }

    /// Alias for [`drop_collection`](Self::drop_collection).
    pub fn reset(&self, collection: &str) -> Result<usize> {
        self.drop_collection(collection)
    }

    /// Re-encode every matching file from one configuration to another:
    /// directory, extension, and encryption may change. Disallowed when the
    /// current encoding is binary and either side names encryption.
    /// Per-file failures are counted, not fatal.
    pub fn convert(
        &self,
        from: &ConvertTarget,
        to: &ConvertTarget,
        collections: Option<&[&str]>,
    ) -> Result<ConvertReport> {
        let encryption_involved = from.encryption.is_some()
            || from.encryption_key.is_some()
            || to.encryption.is_some()
            || to.encryption_key.is_some();
        if self.config.encoding != Encoding::Json && encryption_involved {
            return Err(StoreError::Validation(
                "cannot change encryption settings while the encoding is not json".to_string(),
            ));
        }
        if let Some(algorithm) = from.encryption {
            algorithm.validate_key(from.encryption_key.as_deref().unwrap_or(""))?;
        }
        if let Some(algorithm) = to.encryption {
            algorithm.validate_key(to.encryption_key.as_deref().unwrap_or(""))?;
        }

        let from_dir = from
            .directory
            .clone()
            .unwrap_or_else(|| self.config.directory.clone());
        let to_dir = to
            .directory
            .clone()
            .unwrap_or_else(|| self.config.directory.clone());
        let from_ext = from
            .extension
            .clone()
            .unwrap_or_else(|| self.config.extension.clone());
        let to_ext = to
            .extension
            .clone()
            .unwrap_or_else(|| self.config.extension.clone());

        fs::create_dir_all(&to_dir)?;

        let mut report = ConvertReport::default();
        for entry in fs::read_dir(&from_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext != from_ext {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(filter) = collections {
                if !filter.contains(&name) {
                    continue;
                }
            }

            let to_path = to_dir.join(format!("{}.{}", name, to_ext));
            match self.convert_file(&path, &to_path, from, to) {
                Ok(()) => {
                    report.converted += 1;
                    if path != to_path {
                        if let Err(e) = fs::remove_file(&path) {
                            log::warn!("failed to remove {}: {}", path.display(), e);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("failed to convert {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        // Remove the source directory once it has been fully relocated.
        if from_dir != to_dir {
            if let Ok(mut entries) = fs::read_dir(&from_dir) {
                if entries.next().is_none() {
                    let _ = fs::remove_dir(&from_dir);
                }
            }
        }

        Ok(report)
    }

    fn convert_file(
        &self,
        from_path: &Path,
        to_path: &Path,
        from: &ConvertTarget,
        to: &ConvertTarget,
    ) -> Result<()> {
        let raw = fs::read(from_path)?;
        let value = match (from.encryption, from.encryption_key.as_deref()) {
            (Some(algorithm), Some(key)) => {
                let text = std::str::from_utf8(&raw).map_err(|_| {
                    StoreError::Decode("encrypted file is not valid utf-8".to_string())
                })?;
                crypto::decrypt(text, algorithm, key)?
            }
            _ => codec::decode(&raw, &self.config)?,
        };
        let out = match (to.encryption, to.encryption_key.as_deref()) {
            (Some(algorithm), Some(key)) => crypto::encrypt(&value, algorithm, key)?.into_bytes(),
            _ => codec::encode(&value, &self.config)?,
        };
        fs::write(to_path, out)?;
        Ok(())
    }

    /// Discard the token index and reinsert every document in file order.
    pub fn rebuild_index(&mut self, collection: &str) -> Result<RebuildReport> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "collection '{}'",
                collection
            )));
        }
        let documents = self.read_collection(&path)?;
        Ok(self.index.rebuild(&documents, TOKEN_FIELD))
    }

    /// In-order dump of the token index: documents sorted by token.
    pub fn index_documents(&self) -> Vec<Document> {
        self.index.traverse()
    }

    /// Physical layout diagnostics for a collection.
    pub fn chunk_info(&self, collection: &str) -> Result<Option<ChunkInfo>> {
        validate_name(collection)?;
        self.store.chunk_info(&self.collection_path(collection))
    }

    /// Generate a random hex encryption key of `len_bytes` bytes.
    pub fn generate_key(len_bytes: usize) -> String {
        crypto::generate_key(len_bytes)
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.config
            .directory
            .join(format!("{}.{}", collection, self.config.extension))
    }

    fn read_collection(&self, path: &Path) -> Result<Vec<Document>> {
        match self.store.read(path)? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| {
                    Document::from_value(item).ok_or_else(|| {
                        StoreError::Decode("collection contains a non-document entry".to_string())
                    })
                })
                .collect(),
            Some(_) => Err(StoreError::Decode(
                "collection does not hold a document array".to_string(),
            )),
        }
    }

    fn write_collection(&self, path: &Path, documents: Vec<Document>) -> Result<()> {
        let payload = Value::Array(documents.into_iter().map(Value::from).collect());
        self.store.write(path, &payload)
    }

    /// A candidate duplicates a record when every caller-supplied field
    /// (the configured primary key excluded) is deep-equal on both sides.
    fn is_duplicate(&self, existing: &[Document], candidate: &Document) -> bool {
        let key_field = self.config.auto_primary_key.as_deref();
        existing.iter().any(|record| {
            candidate.iter().all(|(field, value)| {
                Some(field.as_str()) == key_field || record.get(field) == Some(value)
            })
        })
    }

    /// Whether the merged result of an edit collides with another record on
    /// the patched fields. A patch that rewrites the primary key is treated
    /// as unique by construction.
    fn collides(
        &self,
        documents: &[Document],
        editing: usize,
        merged: &Document,
        patch: &Document,
    ) -> bool {
        let key_field = self.config.auto_primary_key.as_deref();
        if patch
            .fields()
            .any(|field| Some(field.as_str()) == key_field)
        {
            return false;
        }
        documents.iter().enumerate().any(|(j, other)| {
            j != editing
                && patch
                    .fields()
                    .all(|field| other.get(field) == merged.get(field))
        })
    }

    fn generate_unique_id(&self) -> Value {
        if self.config.encoding == Encoding::Binary && self.config.object_id {
            return Value::Id(Uuid::new_v4());
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
            .collect();
        Value::String(format!("{}{}", base36(millis), suffix))
    }
}

fn validate_name(collection: &str) -> Result<()> {
    if collection.is_empty() {
        return Err(StoreError::Validation(
            "collection name required".to_string(),
        ));
    }
    if collection
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '.' || c == ' ')
    {
        return Err(StoreError::Validation(
            "invalid collection name: avoid path separators, dots and spaces".to_string(),
        ));
    }
    Ok(())
}

fn base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(ID_CHARS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
