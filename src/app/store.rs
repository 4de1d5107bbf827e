//! JSON-document-backed record collections.
//!
//! Each collection lives in a single file shaped like `{ "<plural>": [ ... ] }`.
//! Appends rewrite the whole document; a per-store lock serializes writers so
//! concurrent appends never clobber each other.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use crate::app::error::StorageError;
use crate::app::model::{Book, Post};

/// An entity that can be kept in a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Top-level key of the collection in the backing document.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for Book {
    const COLLECTION: &'static str = "books";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Post {
    const COLLECTION: &'static str = "posts";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    /// All records, newest first.
    async fn list(&self) -> Result<Vec<T>, StorageError>;

    /// Appends `record` and returns it.
    async fn add(&self, record: T) -> Result<T, StorageError>;
}

#[derive(Debug)]
pub struct LocalFsRecordStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> LocalFsRecordStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty document if none exists yet.
    pub async fn init(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        match fs::try_exists(&self.path).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        let mut root = Map::new();
        root.insert(T::COLLECTION.to_owned(), Value::Array(Vec::new()));
        write_document_atomic(&self.path, T::COLLECTION, &root).await?;
        tracing::info!(path = %self.path.display(), collection = T::COLLECTION, "created store");
        Ok(())
    }

    async fn read_text(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for LocalFsRecordStore<T> {
    async fn list(&self) -> Result<Vec<T>, StorageError> {
        let text = self.read_text().await?.ok_or_else(|| StorageError::Read {
            path: self.path.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;

        let mut records: Vec<T> = match decode_collection(&text, T::COLLECTION) {
            Ok(records) => records,
            Err(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "store document is malformed, listing as empty"
                );
                Vec::new()
            }
        };
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(records)
    }

    async fn add(&self, record: T) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut root = match self.read_text().await? {
            Some(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(root)) => root,
                Ok(_) => Map::new(),
                Err(source) => {
                    return Err(StorageError::Corrupt {
                        path: self.path.clone(),
                        source,
                    });
                }
            },
            None => Map::new(),
        };

        let mut entries = match root.remove(T::COLLECTION) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };

        let duplicate = entries
            .iter()
            .any(|entry| entry.get("id").and_then(Value::as_str) == Some(record.id()));
        if duplicate {
            return Err(StorageError::DuplicateId {
                collection: T::COLLECTION,
                id: record.id().to_owned(),
            });
        }

        let value = serde_json::to_value(&record).map_err(|source| StorageError::Serialize {
            collection: T::COLLECTION,
            source,
        })?;
        entries.push(value);
        root.insert(T::COLLECTION.to_owned(), Value::Array(entries));

        write_document_atomic(&self.path, T::COLLECTION, &root).await?;
        tracing::debug!(collection = T::COLLECTION, id = record.id(), "record added");
        Ok(record)
    }
}

fn decode_collection<T: Record>(text: &str, collection: &str) -> Result<Vec<T>, String> {
    let root: Value = serde_json::from_str(text).map_err(|err| format!("parse json: {err}"))?;
    let Value::Object(mut root) = root else {
        return Err("document root is not an object".to_owned());
    };
    match root.remove(collection) {
        Some(entries @ Value::Array(_)) => {
            serde_json::from_value(entries).map_err(|err| format!("decode {collection}: {err}"))
        }
        _ => Err(format!("document has no `{collection}` array")),
    }
}

async fn write_document_atomic(
    path: &Path,
    collection: &'static str,
    root: &Map<String, Value>,
) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut data = serde_json::to_vec_pretty(root)
        .map_err(|source| StorageError::Serialize { collection, source })?;
    data.push(b'\n');

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    if let Err(source) = fs::write(&tmp_path, &data).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(write_err(source));
    }
    if let Err(source) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(write_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone as _;

    use super::*;

    fn post(id: &str, millis: i64) -> Post {
        Post {
            id: id.to_owned(),
            title: format!("title {id}"),
            body: "<p>body</p>".to_owned(),
            created_at: Utc.timestamp_millis_opt(millis).single().expect("timestamp"),
        }
    }

    async fn fresh_store(dir: &Path) -> anyhow::Result<LocalFsRecordStore<Post>> {
        let store = LocalFsRecordStore::<Post>::new(dir.join("data").join("posts.json"));
        store.init().await?;
        Ok(store)
    }

    #[tokio::test]
    async fn init_creates_empty_document() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;

        let text = std::fs::read_to_string(store.path())?;
        let value: Value = serde_json::from_str(&text)?;
        assert_eq!(value, serde_json::json!({ "posts": [] }));
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn init_keeps_existing_document() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        store.add(post("a", 1)).await?;

        store.init().await?;
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn add_then_list_returns_newest_first() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;

        store.add(post("middle", 2_000)).await?;
        store.add(post("oldest", 1_000)).await?;
        let added = store.add(post("newest", 3_000)).await?;
        assert_eq!(added.id, "newest");

        let ids: Vec<String> = store.list().await?.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["newest", "middle", "oldest"]);
        Ok(())
    }

    #[tokio::test]
    async fn document_keeps_append_order() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        store.add(post("b", 2)).await?;
        store.add(post("a", 1)).await?;

        let value: Value = serde_json::from_str(&std::fs::read_to_string(store.path())?)?;
        let ids: Vec<&str> = value["posts"]
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|p| p["id"].as_str())
            .collect();
        assert_eq!(ids, ["b", "a"]);
        Ok(())
    }

    #[tokio::test]
    async fn list_is_repeatable() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        store.add(post("a", 1)).await?;
        store.add(post("b", 2)).await?;

        let first = store.list().await?;
        let second = store.list().await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn list_treats_malformed_documents_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;

        for content in ["not json", "null", "[]", r#"{"other": 1}"#, r#"{"posts": 3}"#] {
            std::fs::write(store.path(), content)?;
            assert!(store.list().await?.is_empty(), "content={content}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn list_fails_when_document_is_missing() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = LocalFsRecordStore::<Post>::new(temp.path().join("missing.json"));
        assert!(matches!(
            store.list().await,
            Err(StorageError::Read { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn add_refuses_to_overwrite_invalid_json() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        std::fs::write(store.path(), "{ truncated")?;

        let err = store.add(post("a", 1)).await.expect_err("corrupt");
        assert!(matches!(err, StorageError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(store.path())?, "{ truncated");
        Ok(())
    }

    #[tokio::test]
    async fn add_preserves_unknown_keys_and_fields() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        std::fs::write(
            store.path(),
            r#"{"version": 2, "posts": [{"id": "old", "title": "t", "body": "b", "createdAt": "2024-01-01T00:00:00.000Z", "tags": ["x"]}]}"#,
        )?;

        store.add(post("new", 1)).await?;

        let value: Value = serde_json::from_str(&std::fs::read_to_string(store.path())?)?;
        assert_eq!(value["version"], 2);
        assert_eq!(value["posts"][0]["tags"][0], "x");
        assert_eq!(value["posts"][1]["id"], "new");
        Ok(())
    }

    #[tokio::test]
    async fn add_rejects_duplicate_ids() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = fresh_store(temp.path()).await?;
        store.add(post("same", 1)).await?;

        let err = store.add(post("same", 2)).await.expect_err("duplicate");
        assert!(matches!(err, StorageError::DuplicateId { .. }));
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_adds_are_not_lost() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = Arc::new(fresh_store(temp.path()).await?);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add(post(&format!("p{i}"), i)).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(store.list().await?.len(), 32);
        Ok(())
    }
}
