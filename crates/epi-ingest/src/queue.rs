//! Notification queues that announce new inbound payloads.
//!
//! Delivery is at-least-once. A received message is hidden for its
//! visibility timeout; if it is not deleted before the timeout expires it is
//! delivered again.

use std::{
  collections::{HashMap, VecDeque},
  future::Future,
  sync::Arc,
  time::Duration,
};

use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

use crate::{
  Result,
  storage::{INBOUND_PREFIX, ObjectStore},
};

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  /// Handle used to acknowledge (delete) this delivery.
  pub receipt: String,
  pub body:    String,
}

impl Message {
  /// The inbound object key this message points at.
  ///
  /// Accepts a bucket event notification (`Records[0].s3.object.key`), a
  /// JSON object with a `key` field, or a bare key.
  pub fn inbound_key(&self) -> Option<String> {
    let body = self.body.trim();
    if body.is_empty() {
      return None;
    }
    let Ok(value) = serde_json::from_str::<Value>(body) else {
      return Some(body.to_owned());
    };
    let key = value
      .pointer("/Records/0/s3/object/key")
      .or_else(|| value.get("key"))
      .and_then(Value::as_str)
      .or_else(|| value.as_str())?;
    Some(key.to_owned())
  }
}

pub trait MessageQueue: Send + Sync {
  /// Receive up to `max` messages, waiting at most `wait` for the first one.
  /// Received messages stay hidden for `visibility`.
  fn receive(
    &self,
    max: usize,
    wait: Duration,
    visibility: Duration,
  ) -> impl Future<Output = Result<Vec<Message>>> + Send + '_;

  /// Acknowledge a message so it is never delivered again.
  fn delete<'a>(&'a self, receipt: &'a str) -> impl Future<Output = Result<()>> + Send + 'a;
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

// ─── Inbox scanning ──────────────────────────────────────────────────────────

/// A queue derived from the `in/` folder of an object store: every inbound
/// key is a message whose receipt is the key itself.
pub struct InboxQueue<O> {
  objects: Arc<O>,
  hidden:  Mutex<HashMap<String, Instant>>,
}

impl<O: ObjectStore> InboxQueue<O> {
  pub fn new(objects: Arc<O>) -> Self { Self { objects, hidden: Mutex::new(HashMap::new()) } }

  async fn poll(&self, max: usize, visibility: Duration) -> Result<Vec<Message>> {
    let keys = self.objects.list(INBOUND_PREFIX).await?;
    let now = Instant::now();
    let mut hidden = self.hidden.lock().await;
    hidden.retain(|key, until| *until > now && keys.contains(key));

    let mut messages = Vec::new();
    for key in keys {
      if messages.len() == max {
        break;
      }
      if hidden.contains_key(&key) {
        continue;
      }
      hidden.insert(key.clone(), now + visibility);
      messages.push(Message { receipt: key.clone(), body: key });
    }
    Ok(messages)
  }
}

impl<O: ObjectStore> MessageQueue for InboxQueue<O> {
  async fn receive(&self, max: usize, wait: Duration, visibility: Duration) -> Result<Vec<Message>> {
    let deadline = Instant::now() + wait;
    loop {
      let messages = self.poll(max, visibility).await?;
      let now = Instant::now();
      if !messages.is_empty() || now >= deadline {
        return Ok(messages);
      }
      tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
  }

  async fn delete(&self, receipt: &str) -> Result<()> {
    self.hidden.lock().await.remove(receipt);
    Ok(())
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

struct Queued {
  message:      Message,
  hidden_until: Option<Instant>,
}

/// A queue held in memory, for tests.
#[derive(Default)]
pub struct MemoryQueue {
  messages: Mutex<VecDeque<Queued>>,
}

impl MemoryQueue {
  pub fn new() -> Self { Self::default() }

  /// Enqueue a message body. Returns its receipt.
  pub async fn send(&self, body: impl Into<String>) -> String {
    let receipt = Uuid::new_v4().to_string();
    let message = Message { receipt: receipt.clone(), body: body.into() };
    self.messages.lock().await.push_back(Queued { message, hidden_until: None });
    receipt
  }

  /// Messages not yet deleted, visible or not.
  pub async fn len(&self) -> usize { self.messages.lock().await.len() }

  pub async fn is_empty(&self) -> bool { self.len().await == 0 }
}

impl MessageQueue for MemoryQueue {
  async fn receive(&self, max: usize, wait: Duration, visibility: Duration) -> Result<Vec<Message>> {
    let deadline = Instant::now() + wait;
    loop {
      let now = Instant::now();
      let mut delivered = Vec::new();
      {
        let mut messages = self.messages.lock().await;
        for queued in messages.iter_mut() {
          if delivered.len() == max {
            break;
          }
          if queued.hidden_until.is_some_and(|until| until > now) {
            continue;
          }
          queued.hidden_until = Some(now + visibility);
          delivered.push(queued.message.clone());
        }
      }
      if !delivered.is_empty() || now >= deadline {
        return Ok(delivered);
      }
      tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
  }

  async fn delete(&self, receipt: &str) -> Result<()> {
    self.messages.lock().await.retain(|q| q.message.receipt != receipt);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;

  use super::*;
  use crate::storage::MemoryObjectStore;

  fn message(body: &str) -> Message { Message { receipt: "r".into(), body: body.into() } }

  #[test]
  fn inbound_key_from_event_notification() {
    let body = r#"{"Records":[{"s3":{"object":{"key":"in/abc.json"}}}]}"#;
    assert_eq!(message(body).inbound_key().as_deref(), Some("in/abc.json"));
    assert_eq!(message("in/abc.json").inbound_key().as_deref(), Some("in/abc.json"));
    assert_eq!(message(r#"{"key":"in/x.json"}"#).inbound_key().as_deref(), Some("in/x.json"));
    assert_eq!(message("  ").inbound_key(), None);
  }

  #[tokio::test]
  async fn memory_queue_redelivers_after_visibility_timeout() {
    let queue = MemoryQueue::new();
    queue.send("in/a.json").await;

    let first = queue.receive(10, Duration::ZERO, Duration::from_millis(20)).await.unwrap();
    assert_eq!(first.len(), 1);
    let hidden = queue.receive(10, Duration::ZERO, Duration::from_millis(20)).await.unwrap();
    assert!(hidden.is_empty());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let again = queue.receive(10, Duration::ZERO, Duration::from_secs(60)).await.unwrap();
    assert_eq!(again, first);

    queue.delete(&again[0].receipt).await.unwrap();
    assert!(queue.is_empty().await);
  }

  #[tokio::test]
  async fn inbox_queue_hides_received_keys() {
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put("in/a.json", Bytes::from_static(b"{}")).await.unwrap();
    objects.put("in/b.json", Bytes::from_static(b"{}")).await.unwrap();
    objects.put("processed/c.json", Bytes::from_static(b"{}")).await.unwrap();
    let queue = InboxQueue::new(objects);

    let first = queue.receive(1, Duration::ZERO, Duration::from_secs(60)).await.unwrap();
    assert_eq!(first[0].inbound_key().as_deref(), Some("in/a.json"));
    let second = queue.receive(10, Duration::ZERO, Duration::from_secs(60)).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].body, "in/b.json");
  }
}
