//! Object storage for inbound payloads.
//!
//! Keys are `/`-separated paths. Payloads arrive under `in/` and end up
//! under `processed/` or `failed/`.

use std::{
  collections::BTreeMap,
  future::Future,
  path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{Error, Result};

pub const INBOUND_PREFIX: &str = "in/";
pub const PROCESSED_PREFIX: &str = "processed/";
pub const FAILED_PREFIX: &str = "failed/";

/// The file name part of an inbound key: `in/abc.json` → `abc.json`.
pub fn file_name(key: &str) -> &str { key.strip_prefix(INBOUND_PREFIX).unwrap_or(key) }

pub fn processed_key(key: &str) -> String { format!("{PROCESSED_PREFIX}{}", file_name(key)) }

pub fn failed_key(key: &str) -> String { format!("{FAILED_PREFIX}{}", file_name(key)) }

/// Abstraction over a bucket of objects.
pub trait ObjectStore: Send + Sync {
  /// Fetch an object. Fails with [`Error::ObjectNotFound`] when absent.
  fn get<'a>(&'a self, key: &'a str) -> impl Future<Output = Result<Bytes>> + Send + 'a;

  fn put<'a>(&'a self, key: &'a str, body: Bytes) -> impl Future<Output = Result<()>> + Send + 'a;

  fn copy<'a>(&'a self, from: &'a str, to: &'a str) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Remove an object. Deleting a missing object is not an error.
  fn delete<'a>(&'a self, key: &'a str) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Keys starting with `prefix`, sorted.
  fn list<'a>(&'a self, prefix: &'a str) -> impl Future<Output = Result<Vec<String>>> + Send + 'a;
}

// ─── Local directory ─────────────────────────────────────────────────────────

/// A bucket backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
  root: PathBuf,
}

impl LocalObjectStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  fn resolve(&self, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key);
    let safe = !key.is_empty()
      && relative.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe {
      return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(self.root.join(relative))
  }

  fn io_error(key: &str, source: std::io::Error) -> Error {
    if source.kind() == std::io::ErrorKind::NotFound {
      Error::ObjectNotFound(key.to_owned())
    } else {
      Error::Storage { key: key.to_owned(), source }
    }
  }
}

impl ObjectStore for LocalObjectStore {
  async fn get(&self, key: &str) -> Result<Bytes> {
    let path = self.resolve(key)?;
    let body = tokio::fs::read(&path).await.map_err(|e| Self::io_error(key, e))?;
    Ok(Bytes::from(body))
  }

  async fn put(&self, key: &str, body: Bytes) -> Result<()> {
    let path = self.resolve(key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(|e| Self::io_error(key, e))?;
    }
    tokio::fs::write(&path, &body).await.map_err(|e| Self::io_error(key, e))
  }

  async fn copy(&self, from: &str, to: &str) -> Result<()> {
    let (source, target) = (self.resolve(from)?, self.resolve(to)?);
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(|e| Self::io_error(to, e))?;
    }
    tokio::fs::copy(&source, &target).await.map_err(|e| Self::io_error(from, e))?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let path = self.resolve(key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(Self::io_error(key, e)),
    }
  }

  async fn list(&self, prefix: &str) -> Result<Vec<String>> {
    // Prefixes are directory-shaped (`in/`); list that directory only.
    let (dir, name_prefix) = match prefix.rsplit_once('/') {
      Some((dir, rest)) => (format!("{dir}/"), rest),
      None => (String::new(), prefix),
    };
    let dir_path = if dir.is_empty() { self.root.clone() } else { self.resolve(dir.trim_end_matches('/'))? };

    let mut entries = match tokio::fs::read_dir(&dir_path).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
      Err(e) => return Err(Self::io_error(prefix, e)),
    };

    let mut keys = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| Self::io_error(prefix, e))? {
      let is_file = entry.file_type().await.map_err(|e| Self::io_error(prefix, e))?.is_file();
      let name = entry.file_name().to_string_lossy().into_owned();
      if is_file && name.starts_with(name_prefix) {
        keys.push(format!("{dir}{name}"));
      }
    }
    keys.sort();
    Ok(keys)
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// A bucket held in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
  objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryObjectStore {
  pub fn new() -> Self { Self::default() }
}

impl ObjectStore for MemoryObjectStore {
  async fn get(&self, key: &str) -> Result<Bytes> {
    self.objects.lock().await.get(key).cloned().ok_or_else(|| Error::ObjectNotFound(key.to_owned()))
  }

  async fn put(&self, key: &str, body: Bytes) -> Result<()> {
    self.objects.lock().await.insert(key.to_owned(), body);
    Ok(())
  }

  async fn copy(&self, from: &str, to: &str) -> Result<()> {
    let mut objects = self.objects.lock().await;
    let body = objects.get(from).cloned().ok_or_else(|| Error::ObjectNotFound(from.to_owned()))?;
    objects.insert(to.to_owned(), body);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.objects.lock().await.remove(key);
    Ok(())
  }

  async fn list(&self, prefix: &str) -> Result<Vec<String>> {
    Ok(self.objects.lock().await.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rewrites_inbound_keys() {
    assert_eq!(processed_key("in/abc.json"), "processed/abc.json");
    assert_eq!(failed_key("in/abc.json"), "failed/abc.json");
  }

  #[tokio::test]
  async fn local_store_round_trips_through_folders() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path());

    store.put("in/b.json", Bytes::from_static(b"{}")).await.unwrap();
    store.put("in/a.json", Bytes::from_static(b"[]")).await.unwrap();
    assert_eq!(store.list("in/").await.unwrap(), ["in/a.json", "in/b.json"]);

    store.copy("in/a.json", "processed/a.json").await.unwrap();
    store.delete("in/a.json").await.unwrap();
    store.delete("in/a.json").await.unwrap();

    assert_eq!(store.list("in/").await.unwrap(), ["in/b.json"]);
    assert_eq!(store.get("processed/a.json").await.unwrap(), Bytes::from_static(b"[]"));
    assert!(matches!(store.get("in/a.json").await, Err(Error::ObjectNotFound(_))));
    assert!(store.list("failed/").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path());
    assert!(matches!(store.get("../secret").await, Err(Error::InvalidKey(_))));
    assert!(matches!(store.get("/etc/passwd").await, Err(Error::InvalidKey(_))));
  }
}
