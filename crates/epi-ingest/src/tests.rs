//! Worker tests: in-memory queue and bucket, in-memory SQLite store.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use epi_core::store::MetricsStore;
use epi_store_sqlite::SqliteStore;
use serde_json::json;

use crate::{
  ingester::Ingester,
  queue::{InboxQueue, MemoryQueue, MessageQueue},
  storage::{LocalObjectStore, MemoryObjectStore, ObjectStore},
  worker::{Outcome, Worker, WorkerConfig},
};

const CASES: &str = "COVID-19_cases_casesByDay";

fn config() -> WorkerConfig {
  WorkerConfig { max_messages: 10, wait: Duration::ZERO, visibility: Duration::from_secs(60) }
}

fn payload() -> Bytes {
  let body = json!({
    "parent_theme": "infectious_disease",
    "child_theme": "respiratory",
    "topic": "COVID-19",
    "metric_group": "cases",
    "metric": CASES,
    "metric_frequency": "D",
    "geography_type": "Nation",
    "geography": "England",
    "geography_code": "E92000001",
    "age": "all",
    "sex": "all",
    "stratum": "default",
    "refresh_date": "2023-11-20 10:00:00",
    "time_series": [
      {"epiweek": 1, "date": "2023-01-02", "embargo": null, "metric_value": 10},
      {"epiweek": 1, "date": "2023-01-03", "embargo": null, "metric_value": 11},
      {"epiweek": 1, "date": "2023-01-04", "embargo": null, "metric_value": 12},
    ],
  });
  Bytes::from(serde_json::to_vec(&body).unwrap())
}

struct Harness {
  store:   Arc<SqliteStore>,
  objects: Arc<MemoryObjectStore>,
  queue:   Arc<MemoryQueue>,
  worker:  Worker<SqliteStore, MemoryObjectStore, MemoryQueue>,
}

async fn harness() -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let objects = Arc::new(MemoryObjectStore::new());
  let queue = Arc::new(MemoryQueue::new());
  let worker = Worker::new(
    Ingester::new(store.clone(), false),
    objects.clone(),
    queue.clone(),
    config(),
  );
  Harness { store, objects, queue, worker }
}

#[tokio::test]
async fn ingesting_a_payload_twice_keeps_the_row_count() {
  let h = harness().await;

  h.objects.put("in/cases.json", payload()).await.unwrap();
  h.queue.send("in/cases.json").await;
  assert_eq!(h.worker.run_once().await.unwrap(), [Outcome::Processed]);
  assert_eq!(h.store.count_time_series("COVID-19", CASES).await.unwrap(), 3);

  h.objects.put("in/cases.json", payload()).await.unwrap();
  h.queue.send("in/cases.json").await;
  assert_eq!(h.worker.run_once().await.unwrap(), [Outcome::Processed]);
  assert_eq!(h.store.count_time_series("COVID-19", CASES).await.unwrap(), 3);

  assert!(h.objects.list("in/").await.unwrap().is_empty());
  assert_eq!(h.objects.list("processed/").await.unwrap(), ["processed/cases.json"]);
  assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn invalid_payloads_move_to_failed() {
  let h = harness().await;
  h.objects.put("in/broken.json", Bytes::from_static(b"{\"topic\": \"COVID-19\"}")).await.unwrap();
  h.queue.send(r#"{"Records":[{"s3":{"object":{"key":"in/broken.json"}}}]}"#).await;

  assert_eq!(h.worker.run_once().await.unwrap(), [Outcome::Failed]);
  assert_eq!(h.objects.list("failed/").await.unwrap(), ["failed/broken.json"]);
  assert!(h.objects.list("in/").await.unwrap().is_empty());
  assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn redelivery_of_a_finished_message_is_acknowledged() {
  let h = harness().await;
  h.queue.send("in/gone.json").await;

  assert_eq!(h.worker.run_once().await.unwrap(), [Outcome::Missing]);
  assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn inbox_queue_drives_a_local_bucket() {
  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let objects = Arc::new(LocalObjectStore::new(dir.path()));
  let queue = Arc::new(InboxQueue::new(objects.clone()));
  let worker = Worker::new(Ingester::new(store.clone(), false), objects.clone(), queue.clone(), config());

  objects.put("in/a.json", payload()).await.unwrap();
  objects.put("in/b.json", Bytes::from_static(b"not json")).await.unwrap();

  let mut outcomes = worker.run_once().await.unwrap();
  outcomes.sort_by_key(|o| format!("{o:?}"));
  assert_eq!(outcomes, [Outcome::Failed, Outcome::Processed]);

  assert!(dir.path().join("processed/a.json").exists());
  assert!(dir.path().join("failed/b.json").exists());
  assert!(queue.receive(10, Duration::ZERO, Duration::from_secs(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn escaping_keys_are_acknowledged_as_failed() {
  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let objects = Arc::new(LocalObjectStore::new(dir.path().join("bucket")));
  let queue = Arc::new(MemoryQueue::new());
  let worker = Worker::new(Ingester::new(store.clone(), false), objects.clone(), queue.clone(), config());

  tokio::fs::write(dir.path().join("secret.json"), payload()).await.unwrap();
  queue.send(r#"{"Records":[{"s3":{"object":{"key":"in/../../secret.json"}}}]}"#).await;
  queue.send("/etc/passwd").await;

  assert_eq!(worker.run_once().await.unwrap(), [Outcome::Failed, Outcome::Failed]);
  assert!(queue.is_empty().await);
  assert!(dir.path().join("secret.json").exists());
  assert_eq!(store.count_time_series("COVID-19", CASES).await.unwrap(), 0);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
  let h = harness().await;
  h.worker.run(async {}).await;
}
