//! In-memory source and store used by the pipeline tests
//!
//! `MemoryStore` upserts by the first parameter (the identity), which is the
//! contract the real `handle_*_upsert` procedures provide.

#![allow(dead_code)]

use async_trait::async_trait;
use csync_common::Record;
use csync_ingest::error::{FetchError, WriteError};
use csync_ingest::source::CollectionSource;
use csync_ingest::writer::ProcedureStore;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Canned collections keyed by name; `Err(status)` simulates an HTTP failure
#[derive(Default)]
pub struct MemorySource {
    collections: HashMap<String, Result<Vec<Value>, u16>>,
    requested: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, rows: Vec<Value>) -> Self {
        self.collections.insert(name.to_string(), Ok(rows));
        self
    }

    pub fn failing(mut self, name: &str, status: u16) -> Self {
        self.collections.insert(name.to_string(), Err(status));
        self
    }

    /// Collection names in the order they were fetched
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl CollectionSource for MemorySource {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError> {
        self.requested.lock().unwrap().push(name.to_string());
        match self.collections.get(name) {
            Some(Ok(rows)) => Ok(rows
                .iter()
                .cloned()
                .map(|v| Record::from_value(v).unwrap())
                .collect()),
            Some(Err(status)) => Err(FetchError::Status {
                collection: name.to_string(),
                status: *status,
                body: "simulated failure".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

pub type Row = Vec<Option<String>>;

#[derive(Default)]
struct StoreState {
    /// procedure -> identity -> last parameters written
    rows: HashMap<String, BTreeMap<String, Row>>,
    calls: usize,
    fail_ids: HashSet<String>,
    closed: bool,
}

/// Upsert-by-identity store; clones share state so tests can inspect it
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call whose identity is `id` fails with a procedure error
    pub fn fail_on(&self, id: &str) {
        self.state.lock().unwrap().fail_ids.insert(id.to_string());
    }

    pub fn rows(&self, procedure: &str) -> BTreeMap<String, Row> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(procedure)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, procedure: &str, id: &str) -> Option<Row> {
        self.rows(procedure).get(id).cloned()
    }

    /// Full target state, for before/after comparisons
    pub fn snapshot(&self) -> HashMap<String, BTreeMap<String, Row>> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl ProcedureStore for MemoryStore {
    async fn call(&mut self, procedure: &str, params: &[Option<String>]) -> Result<(), WriteError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let Some(id) = params.first().cloned().flatten() else {
            return Err(WriteError::Procedure {
                procedure: procedure.to_string(),
                code: Some("23502".to_string()),
                message: "null value in column \"id\"".to_string(),
            });
        };
        if state.fail_ids.contains(&id) {
            return Err(WriteError::Procedure {
                procedure: procedure.to_string(),
                code: Some("23503".to_string()),
                message: format!("simulated failure for {}", id),
            });
        }

        state
            .rows
            .entry(procedure.to_string())
            .or_default()
            .insert(id, params.to_vec());
        Ok(())
    }

    async fn close(self) {
        self.state.lock().unwrap().closed = true;
    }
}
