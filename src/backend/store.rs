//! In-memory compilation results.
//!
//! Results live for the lifetime of the process; there is no eviction.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::backend::artifact::CompilationData;

/// Outcome reported by `/status/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationStatus {
    Success,
    Failure,
}

impl CompilationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilationStatus::Success => "SUCCESS",
            CompilationStatus::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilationRecord {
    pub status: CompilationStatus,
    pub data: CompilationData,
}

/// Fresh compilation id: `tmp` followed by the first ten characters of a
/// UUIDv4.
pub fn new_compilation_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("tmp{}", &uuid[..10])
}

/// Concurrent map from compilation id to record.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: Arc<DashMap<String, CompilationRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under a new id and return the id.
    pub fn insert(&self, record: CompilationRecord) -> String {
        loop {
            let id = new_compilation_id();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.records.entry(id.clone()) {
                slot.insert(record);
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<CompilationRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
