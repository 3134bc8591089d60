//! In-memory store double for the cache tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::cache::{AssignmentRecord, AssignmentService, CacheKey, Day, PlaceRequest};
use crate::rpc::RpcError;

#[allow(clippy::too_many_arguments)]
pub(crate) fn record(
    id: i64,
    group_id: i64,
    day: Day,
    module_index: u32,
    subject_id: i64,
    teacher_id: i64,
    shorten: &str,
    color: &str,
) -> AssignmentRecord {
    AssignmentRecord {
        id,
        group_id,
        day,
        module_index,
        subject_id,
        teacher_id,
        subject_shorten: shorten.to_string(),
        subject_color: color.to_string(),
    }
}

fn injected(what: &str) -> RpcError {
    RpcError::Remote {
        code: "injected".to_string(),
        message: format!("injected {what} failure"),
        details: None,
    }
}

/// Behaves like the sidecar's upsert-on-slot store.
#[derive(Default)]
pub(crate) struct FakeService {
    records: Mutex<Vec<AssignmentRecord>>,
    /// subject id -> (shorten, color)
    subjects: Mutex<HashMap<i64, (String, String)>>,
    fail_fetch: AtomicBool,
    fail_place: AtomicBool,
    fail_delete: AtomicBool,
    /// Slot reported back by `place` instead of the stored one.
    ack_slot: Mutex<Option<CacheKey>>,
    pub fetch_calls: AtomicUsize,
    pub place_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl FakeService {
    pub fn with_records(records: Vec<AssignmentRecord>) -> Self {
        let svc = Self::default();
        for r in &records {
            svc.subjects
                .lock()
                .insert(r.subject_id, (r.subject_shorten.clone(), r.subject_color.clone()));
        }
        *svc.records.lock() = records;
        svc
    }

    pub fn add_subject(&self, id: i64, shorten: &str, color: &str) {
        self.subjects
            .lock()
            .insert(id, (shorten.to_string(), color.to_string()));
    }

    /// Changes a subject and the denormalized fields of every record using it.
    pub fn recolor_subject(&self, id: i64, color: &str) {
        if let Some(s) = self.subjects.lock().get_mut(&id) {
            s.1 = color.to_string();
        }
        for r in self.records.lock().iter_mut().filter(|r| r.subject_id == id) {
            r.subject_color = color.to_string();
        }
    }

    pub fn fail_fetch(&self, on: bool) {
        self.fail_fetch.store(on, Ordering::SeqCst);
    }

    pub fn fail_place(&self, on: bool) {
        self.fail_place.store(on, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, on: bool) {
        self.fail_delete.store(on, Ordering::SeqCst);
    }

    pub fn acknowledge_slot(&self, slot: Option<CacheKey>) {
        *self.ack_slot.lock() = slot;
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssignmentService for FakeService {
    async fn fetch_all(&self) -> Result<Vec<AssignmentRecord>, RpcError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch"));
        }
        Ok(self.records.lock().clone())
    }

    async fn place(&self, req: &PlaceRequest) -> Result<AssignmentRecord, RpcError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_place.load(Ordering::SeqCst) {
            return Err(injected("place"));
        }
        let Some((shorten, color)) = self.subjects.lock().get(&req.subject_id).cloned() else {
            return Err(RpcError::Remote {
                code: "db_insert_failed".to_string(),
                message: format!("subject {} not found", req.subject_id),
                details: None,
            });
        };

        let mut records = self.records.lock();
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let id = match records.iter_mut().find(|r| r.key() == req.key) {
            Some(existing) => {
                existing.subject_id = req.subject_id;
                existing.teacher_id = req.teacher_id;
                existing.subject_shorten = shorten;
                existing.subject_color = color;
                existing.id
            }
            None => {
                records.push(AssignmentRecord {
                    id: next_id,
                    group_id: req.key.group_id,
                    day: req.key.day,
                    module_index: req.key.module_index,
                    subject_id: req.subject_id,
                    teacher_id: req.teacher_id,
                    subject_shorten: shorten,
                    subject_color: color,
                });
                next_id
            }
        };
        let mut ack = records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| injected("lookup"))?;
        if let Some(slot) = *self.ack_slot.lock() {
            ack.group_id = slot.group_id;
            ack.day = slot.day;
            ack.module_index = slot.module_index;
        }
        Ok(ack)
    }

    async fn delete(&self, assignment_id: i64) -> Result<(), RpcError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.id != assignment_id);
        if records.len() == before {
            return Err(RpcError::Remote {
                code: "not_found".to_string(),
                message: "assignment not found".to_string(),
                details: None,
            });
        }
        Ok(())
    }
}
