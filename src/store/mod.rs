//! Record store interface
//!
//! The engine needs list/create/update/delete per entity type and nothing
//! else. Persistence internals belong to the implementation. The in-memory
//! store keeps insertion order, which is the order `list` returns.

use crate::models::{
    Company, CompanyPatch, Contact, ContactPatch, Deal, DealPatch, EntityKind, NewCompany,
    NewContact, NewDeal, NewProject, NewTimeEntry, Project, ProjectPatch, TimeEntry,
    TimeEntryPatch,
};
use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[cfg(test)]
pub(crate) mod testing;

/// A record type the store can hold.
pub trait Record: Clone + Send + Sync + 'static {
    type Fields: Send + 'static;
    type Patch: Send + 'static;

    const KIND: EntityKind;

    fn id(&self) -> Uuid;
    fn build(id: Uuid, fields: Self::Fields, now: DateTime<Utc>) -> Self;
    fn apply(&mut self, patch: Self::Patch, now: DateTime<Utc>);
}

/// Operations on one entity type
#[async_trait::async_trait]
pub trait Collection<T: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>>;
    async fn create(&self, fields: T::Fields) -> Result<T>;
    async fn update(&self, id: Uuid, patch: T::Patch) -> Result<Option<T>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<T>> {
        Ok(self.list().await?.into_iter().find(|r| r.id() == id))
    }
}

/// Trait for the full record store
pub trait RecordStore: Send + Sync {
    fn companies(&self) -> &dyn Collection<Company>;
    fn contacts(&self) -> &dyn Collection<Contact>;
    fn deals(&self) -> &dyn Collection<Deal>;
    fn projects(&self) -> &dyn Collection<Project>;
    fn time_entries(&self) -> &dyn Collection<TimeEntry>;
}

//
// ================= In-memory Implementation =================
//

pub struct MemoryCollection<T: Record> {
    records: RwLock<Vec<T>>,
}

impl<T: Record> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Record> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<T: Record> Collection<T> for MemoryCollection<T> {
    async fn list(&self) -> Result<Vec<T>> {
        Ok(self.records.read().await.clone())
    }

    async fn create(&self, fields: T::Fields) -> Result<T> {
        let record = T::build(Uuid::new_v4(), fields, Utc::now());
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: T::Patch) -> Result<Option<T>> {
        let mut records = self.records.write().await;

        Ok(records.iter_mut().find(|r| r.id() == id).map(|record| {
            record.apply(patch, Utc::now());
            record.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id() != id);
        Ok(records.len() != before)
    }
}

/// In-memory record store for development
#[derive(Default)]
pub struct InMemoryRecordStore {
    companies: MemoryCollection<Company>,
    contacts: MemoryCollection<Contact>,
    deals: MemoryCollection<Deal>,
    projects: MemoryCollection<Project>,
    time_entries: MemoryCollection<TimeEntry>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
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

//
// ================= Record Impls =================
//

fn merge<V>(slot: &mut Option<V>, value: Option<V>) {
    if value.is_some() {
        *slot = value;
    }
}

impl Record for Company {
    type Fields = NewCompany;
    type Patch = CompanyPatch;

    const KIND: EntityKind = EntityKind::Company;

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(id: Uuid, f: NewCompany, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: f.name,
            industry: f.industry,
            website: f.website,
            email: f.email,
            phone: f.phone,
            address: f.address,
            notes: f.notes,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, p: CompanyPatch, now: DateTime<Utc>) {
        if let Some(name) = p.name {
            self.name = name;
        }
        merge(&mut self.industry, p.industry);
        merge(&mut self.website, p.website);
        merge(&mut self.email, p.email);
        merge(&mut self.phone, p.phone);
        merge(&mut self.address, p.address);
        merge(&mut self.notes, p.notes);
        self.updated_at = now;
    }
}

impl Record for Contact {
    type Fields = NewContact;
    type Patch = ContactPatch;

    const KIND: EntityKind = EntityKind::Contact;

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(id: Uuid, f: NewContact, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: f.first_name,
            last_name: f.last_name,
            email: f.email,
            phone: f.phone,
            position: f.position,
            company_id: f.company_id,
            notes: f.notes,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, p: ContactPatch, now: DateTime<Utc>) {
        if let Some(first) = p.first_name {
            self.first_name = first;
        }
        if let Some(last) = p.last_name {
            self.last_name = last;
        }
        merge(&mut self.email, p.email);
        merge(&mut self.phone, p.phone);
        merge(&mut self.position, p.position);
        merge(&mut self.company_id, p.company_id);
        merge(&mut self.notes, p.notes);
        self.updated_at = now;
    }
}

impl Record for Deal {
    type Fields = NewDeal;
    type Patch = DealPatch;

    const KIND: EntityKind = EntityKind::Deal;

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(id: Uuid, f: NewDeal, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: f.title,
            description: f.description,
            company_id: f.company_id,
            contact_id: f.contact_id,
            value: f.value,
            currency: f.currency,
            stage: f.stage,
            probability: f.probability,
            expected_close_date: f.expected_close_date,
            project_id: None,
            tags: f.tags,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, p: DealPatch, now: DateTime<Utc>) {
        if let Some(title) = p.title {
            self.title = title;
        }
        if let Some(value) = p.value {
            self.value = value;
        }
        if let Some(currency) = p.currency {
            self.currency = currency;
        }
        if let Some(stage) = p.stage {
            self.stage = stage;
        }
        if let Some(probability) = p.probability {
            self.probability = probability;
        }
        merge(&mut self.description, p.description);
        merge(&mut self.company_id, p.company_id);
        merge(&mut self.expected_close_date, p.expected_close_date);
        merge(&mut self.project_id, p.project_id);
        self.updated_at = now;
    }
}

impl Record for Project {
    type Fields = NewProject;
    type Patch = ProjectPatch;

    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(id: Uuid, f: NewProject, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: f.name,
            description: f.description,
            company_id: f.company_id,
            deal_id: f.deal_id,
            status: f.status,
            start_date: f.start_date,
            end_date: f.end_date,
            budget: f.budget,
            tags: f.tags,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, p: ProjectPatch, now: DateTime<Utc>) {
        if let Some(name) = p.name {
            self.name = name;
        }
        if let Some(status) = p.status {
            self.status = status;
        }
        if let Some(budget) = p.budget {
            self.budget = budget;
        }
        merge(&mut self.description, p.description);
        merge(&mut self.company_id, p.company_id);
        merge(&mut self.start_date, p.start_date);
        merge(&mut self.end_date, p.end_date);
        self.updated_at = now;
    }
}

impl Record for TimeEntry {
    type Fields = NewTimeEntry;
    type Patch = TimeEntryPatch;

    const KIND: EntityKind = EntityKind::TimeEntry;

    fn id(&self) -> Uuid {
        self.id
    }

    fn build(id: Uuid, f: NewTimeEntry, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id: f.project_id,
            company_id: f.company_id,
            description: f.description,
            hours: f.hours,
            date: f.date,
            billable: f.billable,
            hourly_rate: f.hourly_rate,
            created_at: now,
        }
    }

    fn apply(&mut self, p: TimeEntryPatch, _now: DateTime<Utc>) {
        if let Some(description) = p.description {
            self.description = description;
        }
        if let Some(hours) = p.hours {
            self.hours = hours;
        }
        if let Some(date) = p.date {
            self.date = date;
        }
        if let Some(billable) = p.billable {
            self.billable = billable;
        }
        merge(&mut self.project_id, p.project_id);
        merge(&mut self.hourly_rate, p.hourly_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(name: &str) -> NewCompany {
        NewCompany {
            name: name.to_string(),
            ..NewCompany::default()
        }
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = InMemoryRecordStore::new();
        store.companies().create(company("First")).await.unwrap();
        store.companies().create(company("Second")).await.unwrap();

        let names: Vec<String> = store
            .companies()
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_update_merges_only_present_fields() {
        let store = InMemoryRecordStore::new();
        let created = store
            .companies()
            .create(NewCompany {
                name: "Acme".to_string(),
                industry: Some("Retail".to_string()),
                ..NewCompany::default()
            })
            .await
            .unwrap();

        let updated = store
            .companies()
            .update(
                created.id,
                CompanyPatch {
                    website: Some("acme.test".to_string()),
                    ..CompanyPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.industry.as_deref(), Some("Retail"));
        assert_eq!(updated.website.as_deref(), Some("acme.test"));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_delete_of_missing_record() {
        let store = InMemoryRecordStore::new();
        let missing = Uuid::new_v4();

        assert!(store
            .companies()
            .update(missing, CompanyPatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(!store.companies().delete(missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = InMemoryRecordStore::new();
        let created = store.companies().create(company("Acme")).await.unwrap();

        assert_eq!(store.companies().get(created.id).await.unwrap(), Some(created.clone()));
        assert!(store.companies().delete(created.id).await.unwrap());
        assert!(store.companies().get(created.id).await.unwrap().is_none());
    }
}
