//! Test-only store that counts calls and injects failures per entity type.

use super::{Collection, MemoryCollection, Record, RecordStore};
use crate::error::EngineError;
use crate::models::{Company, Contact, Deal, Project, TimeEntry};
use crate::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub(crate) struct ScriptedCollection<T: Record> {
    inner: MemoryCollection<T>,
    store_calls: Arc<AtomicUsize>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    fail_lists: AtomicBool,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
}

impl<T: Record> ScriptedCollection<T> {
    fn new(store_calls: Arc<AtomicUsize>) -> Self {
        Self {
            inner: MemoryCollection::new(),
            store_calls,
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail_lists: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_lists(&self) {
        self.fail_lists.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Seed without counting as a call.
    pub(crate) async fn seed(&self, fields: T::Fields) -> T {
        self.inner.create(fields).await.unwrap()
    }

    /// Snapshot without counting as a call.
    pub(crate) async fn snapshot(&self) -> Vec<T> {
        self.inner.list().await.unwrap()
    }

    fn touch(&self) {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl<T: Record> Collection<T> for ScriptedCollection<T> {
    async fn list(&self) -> Result<Vec<T>> {
        self.touch();
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(EngineError::store(format!("{} list unavailable", T::KIND)));
        }
        self.inner.list().await
    }

    async fn create(&self, fields: T::Fields) -> Result<T> {
        self.touch();
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(EngineError::store(format!("{} create rejected", T::KIND)));
        }
        self.inner.create(fields).await
    }

    async fn update(&self, id: Uuid, patch: T::Patch) -> Result<Option<T>> {
        self.touch();
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(EngineError::store(format!("{} update rejected", T::KIND)));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.touch();
        self.inner.delete(id).await
    }
}

pub(crate) struct ScriptedStore {
    calls: Arc<AtomicUsize>,
    pub(crate) companies: ScriptedCollection<Company>,
    pub(crate) contacts: ScriptedCollection<Contact>,
    pub(crate) deals: ScriptedCollection<Deal>,
    pub(crate) projects: ScriptedCollection<Project>,
    pub(crate) time_entries: ScriptedCollection<TimeEntry>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Arc<Self> {
        let calls = Arc::new(AtomicUsize::new(0));
        Arc::new(Self {
            companies: ScriptedCollection::new(calls.clone()),
            contacts: ScriptedCollection::new(calls.clone()),
            deals: ScriptedCollection::new(calls.clone()),
            projects: ScriptedCollection::new(calls.clone()),
            time_entries: ScriptedCollection::new(calls.clone()),
            calls,
        })
    }

    /// Total calls made through the store interface.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecordStore for ScriptedStore {
    fn companies(&self) -> &dyn Collection<Company> {
        &self.companies
    }

    fn contacts(&self) -> &dyn Collection<Contact> {
        &self.contacts
    }

    fn deals(&self) -> &dyn Collection<Deal> {
        &self.deals
    }

    fn projects(&self) -> &dyn Collection<Project> {
        &self.projects
    }

    fn time_entries(&self) -> &dyn Collection<TimeEntry> {
        &self.time_entries
    }
}
