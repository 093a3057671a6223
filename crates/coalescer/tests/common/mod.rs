//! Shared batch functions for coordinator integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coalescer::{BatchFnResult, BatchLoadFn, BatchSaveFn, ItemError};

/// Every batch a recording batch function received, in call order.
#[derive(Clone, Default)]
pub struct CallLog<T> {
    calls: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T: Clone> CallLog<T> {
    fn record(&self, batch: &[T]) {
        self.calls.lock().unwrap().push(batch.to_vec());
    }

    pub fn snapshot(&self) -> Vec<Vec<T>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.snapshot().iter().map(Vec::len).collect()
    }
}

/// Load function that records its input and answers with `respond`.
pub struct RecordingLoader {
    log: CallLog<u32>,
    respond: fn(Vec<u32>) -> BatchFnResult<u32>,
}

impl RecordingLoader {
    pub fn new(respond: fn(Vec<u32>) -> BatchFnResult<u32>) -> (Self, CallLog<u32>) {
        let log = CallLog::default();
        let loader = Self {
            log: log.clone(),
            respond,
        };
        (loader, log)
    }

    /// `keys => keys`
    pub fn identity() -> (Self, CallLog<u32>) {
        Self::new(|keys| Ok(keys.into_iter().map(Ok).collect()))
    }
}

#[async_trait]
impl BatchLoadFn<u32, u32> for RecordingLoader {
    async fn load(&self, keys: Vec<u32>) -> BatchFnResult<u32> {
        self.log.record(&keys);
        (self.respond)(keys)
    }
}

/// Save function that records its input and acknowledges every entry.
pub struct RecordingSaver {
    log: CallLog<(u32, String)>,
}

impl RecordingSaver {
    pub fn new() -> (Self, CallLog<(u32, String)>) {
        let log = CallLog::default();
        (Self { log: log.clone() }, log)
    }
}

#[async_trait]
impl BatchSaveFn<u32, String, bool> for RecordingSaver {
    async fn save(&self, entries: Vec<(u32, String)>) -> BatchFnResult<bool> {
        self.log.record(&entries);
        Ok(entries
            .into_iter()
            .map(|(_, value)| {
                if value.is_empty() {
                    Err(ItemError::new("empty value"))
                } else {
                    Ok(true)
                }
            })
            .collect())
    }
}
