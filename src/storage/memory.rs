use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::RoomStore;

/// Signal delivered to a room's inbox when its alarm fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFired {
    pub scheduled_for: DateTime<Utc>,
}

struct PendingAlarm {
    at: DateTime<Utc>,
    task: JoinHandle<()>,
}

struct Inner {
    values: HashMap<String, serde_json::Value>,
    alarm: Option<PendingAlarm>,
}

/// In-memory [`RoomStore`].
///
/// Alarms are delivered by a spawned sleeper task that sends [`AlarmFired`]
/// on the sink channel; scheduling a replacement aborts the previous
/// sleeper so at most one wake-up is ever pending.
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    alarm_sink: mpsc::UnboundedSender<AlarmFired>,
}

impl MemoryStore {
    pub fn new(alarm_sink: mpsc::UnboundedSender<AlarmFired>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                values: HashMap::new(),
                alarm: None,
            })),
            alarm_sink,
        }
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().await.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.inner.lock().await.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().await.values.remove(key);
        Ok(())
    }

    async fn set_alarm(&self, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.alarm.take() {
            previous.task.abort();
        }

        let sink = self.alarm_sink.clone();
        let store = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            // Clear the pending slot before delivery so a handler that
            // reschedules sees no alarm outstanding
            store.lock().await.alarm = None;
            let _ = sink.send(AlarmFired { scheduled_for: at });
        });
        inner.alarm = Some(PendingAlarm { at, task });
        Ok(())
    }

    async fn get_alarm(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().await.alarm.as_ref().map(|a| a.at))
    }

    async fn delete_alarm(&self) -> Result<()> {
        if let Some(pending) = self.inner.lock().await.alarm.take() {
            pending.task.abort();
        }
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // Abort any sleeper still holding the inner map alive
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(pending) = inner.alarm.take() {
                pending.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RoomStoreExt;
    use chrono::Duration;

    fn store() -> (MemoryStore, mpsc::UnboundedReceiver<AlarmFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryStore::new(tx), rx)
    }

    #[tokio::test]
    async fn test_kv_round_trip() {
        let (store, _rx) = store();
        store.save("room", &serde_json::json!({"code": "ABCDEF"})).await.unwrap();
        let value: Option<serde_json::Value> = store.load("room").await.unwrap();
        assert_eq!(value.unwrap()["code"], "ABCDEF");

        store.delete("room").await.unwrap();
        assert!(store.get("room").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_pending_alarm() {
        let (store, mut rx) = store();
        let t1 = Utc::now() + Duration::seconds(60);
        let t2 = Utc::now() + Duration::milliseconds(20);

        store.set_alarm(t1).await.unwrap();
        assert_eq!(store.get_alarm().await.unwrap(), Some(t1));

        // The replacement supersedes the first alarm entirely
        store.set_alarm(t2).await.unwrap();
        assert_eq!(store.get_alarm().await.unwrap(), Some(t2));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.scheduled_for, t2);
        assert_eq!(store.get_alarm().await.unwrap(), None);

        // Nothing else fires
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_alarm_cancels() {
        let (store, mut rx) = store();
        store
            .set_alarm(Utc::now() + Duration::milliseconds(20))
            .await
            .unwrap();
        store.delete_alarm().await.unwrap();
        assert_eq!(store.get_alarm().await.unwrap(), None);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_past_alarm_fires_immediately() {
        let (store, mut rx) = store();
        store
            .set_alarm(Utc::now() - Duration::seconds(5))
            .await
            .unwrap();
        let fired = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv())
            .await
            .expect("alarm should fire promptly")
            .unwrap();
        assert!(fired.scheduled_for < Utc::now());
    }
}
