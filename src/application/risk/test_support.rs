//! Shared in-memory `RiskStore` test double for the risk substrate's unit
//! tests — a real CAS/atomic-add/lock implementation over a `Mutex`-guarded
//! map, not a stub that always succeeds.

#![cfg(test)]

use crate::domain::errors::AppError;
use crate::domain::ports::{PortResult, RiskStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Entry {
    value: String,
    version: i64,
    expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemoryRiskStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryRiskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RiskStore for InMemoryRiskStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).map(|e| e.value.clone()))
    }

    async fn get_with_version(&self, key: &str) -> PortResult<Option<(String, i64)>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| (e.value.clone(), e.version)))
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_default();
        entry.value = value.to_string();
        entry.version += 1;
        Ok(())
    }

    async fn cas(&self, key: &str, expected_version: i64, new_value: &str) -> PortResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.version == expected_version => {
                entry.value = new_value.to_string();
                entry.version += 1;
                Ok(true)
            }
            None if expected_version == 0 => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: new_value.to_string(),
                        version: 1,
                        expires_at: None,
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn atomic_add(&self, key: &str, delta: i64) -> PortResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_default();
        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + delta;
        entry.value = next.to_string();
        entry.version += 1;
        Ok(next)
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn try_lock(&self, key: &str, ttl_seconds: i64) -> PortResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        let held = entries
            .get(key)
            .map(|e| e.expires_at.is_some_and(|exp| exp > now))
            .unwrap_or(false);
        if held {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: "locked".into(),
                version: entries.get(key).map(|e| e.version + 1).unwrap_or(1),
                expires_at: Some(now + chrono::Duration::seconds(ttl_seconds)),
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str) -> PortResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

pub fn failing_store() -> impl RiskStore {
    struct Failing;

    #[async_trait]
    impl RiskStore for Failing {
        async fn get(&self, _key: &str) -> PortResult<Option<String>> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn get_with_version(&self, _key: &str) -> PortResult<Option<(String, i64)>> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> PortResult<()> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn cas(&self, _key: &str, _expected_version: i64, _new_value: &str) -> PortResult<bool> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn atomic_add(&self, _key: &str, _delta: i64) -> PortResult<i64> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn delete(&self, _key: &str) -> PortResult<()> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn try_lock(&self, _key: &str, _ttl_seconds: i64) -> PortResult<bool> {
            Err(AppError::Internal("store unreachable".into()))
        }
        async fn unlock(&self, _key: &str) -> PortResult<()> {
            Err(AppError::Internal("store unreachable".into()))
        }
    }

    Failing
}
