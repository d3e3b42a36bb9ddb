//! Registry of uploaded documents.
//!
//! Bookkeeping only: clearing the registry does not remove any chunk from
//! the vector store. The registry lives for the server's lifetime and is
//! shared by all request handlers behind a mutex.

use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::models::UploadedDocumentRecord;

#[derive(Default)]
pub struct DocumentRegistry {
    records: Mutex<Vec<UploadedDocumentRecord>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful upload and return the new record.
    pub fn register(
        &self,
        file_name: &str,
        file_type: &str,
        chunks_processed: usize,
        original_path: Option<String>,
    ) -> UploadedDocumentRecord {
        let record = UploadedDocumentRecord {
            document_id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            upload_time: Utc::now(),
            chunks_processed,
            original_path,
        };
        self.lock().push(record.clone());
        record
    }

    /// Snapshot of all records in upload order.
    pub fn list(&self) -> Vec<UploadedDocumentRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut records = self.lock();
        let removed = records.len();
        records.clear();
        removed
    }

    // Records are pushed whole; a poisoned list is still consistent.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UploadedDocumentRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
