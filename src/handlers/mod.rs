//! Action handlers
//!
//! Each action tag maps to one typed [`Command`] built from the intent's
//! entity bag. Parsing happens before any handler runs, so a missing or
//! malformed field never reaches the record store.

use crate::config::DEFAULT_CONTINGENCY_PERCENTAGE;
use crate::error::EngineError;
use crate::intent::{ActionTag, Entities};
use crate::models::{EntityKind, DEFAULT_CURRENCY};
use crate::resolver::{contains_ci, EntityResolver};
use crate::result::ExecutionResult;
use crate::store::{Collection, Record, RecordStore};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod company;
pub mod contact;
pub mod deal;
pub mod filters;
pub mod help;
pub mod project;
pub mod time_entry;

pub use company::{CompanyQuery, CreateCompany, DealSeed, UpdateCompany};
pub use contact::{ContactQuery, CreateContact, UpdateContact};
pub use deal::{CreateDeal, DealQuery, UpdateDeal};
pub use project::{CreateProject, NewProjectArgs, ProjectQuery, UpdateProject};
pub use time_entry::{CreateTimeEntry, TimeEntryQuery, UpdateTimeEntry};

/// Defaults applied when an intent leaves a value out.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub default_currency: String,
    pub default_contingency_percentage: f64,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            default_contingency_percentage: DEFAULT_CONTINGENCY_PERCENTAGE,
        }
    }
}

//
// ================= Commands =================
//

/// How an update/delete intent points at an existing record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordRef {
    Id(Uuid),
    Name(String),
}

impl RecordRef {
    pub fn from_entities(
        entities: &Entities,
        kind: EntityKind,
        id_key: &str,
        name_keys: &[&str],
    ) -> Result<Self> {
        if let Some(id) = entities.id(id_key)? {
            return Ok(Self::Id(id));
        }
        entities
            .first_text(name_keys)
            .map(Self::Name)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "Please tell me which {} you mean (by name or '{}').",
                    kind, id_key
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    CreateCompany(CreateCompany),
    GetCompanies(CompanyQuery),
    UpdateCompany(UpdateCompany),
    DeleteCompany(RecordRef),

    CreateContact(CreateContact),
    GetContacts(ContactQuery),
    UpdateContact(UpdateContact),
    DeleteContact(RecordRef),

    CreateDeal(CreateDeal),
    GetDeals(DealQuery),
    UpdateDeal(UpdateDeal),
    DeleteDeal(RecordRef),

    CreateProject(CreateProject),
    GetProjects(ProjectQuery),
    UpdateProject(UpdateProject),
    DeleteProject(RecordRef),

    CreateTimeEntry(CreateTimeEntry),
    GetTimeEntries(TimeEntryQuery),
    UpdateTimeEntry(UpdateTimeEntry),
    DeleteTimeEntry(RecordRef),

    Help(Option<String>),
    Unknown,
}

impl Command {
    /// Validate the entity bag for `action` and build the typed command.
    pub fn parse(action: ActionTag, e: &Entities) -> Result<Self> {
        use ActionTag as A;

        Ok(match action {
            A::CreateCompany => Self::CreateCompany(CreateCompany::from_entities(e)?),
            A::GetCompanies => Self::GetCompanies(CompanyQuery::from_entities(e)),
            A::UpdateCompany => Self::UpdateCompany(UpdateCompany::from_entities(e)?),
            A::DeleteCompany => Self::DeleteCompany(company::target(e)?),

            A::CreateContact => Self::CreateContact(CreateContact::from_entities(e)?),
            A::GetContacts => Self::GetContacts(ContactQuery::from_entities(e)?),
            A::UpdateContact => Self::UpdateContact(UpdateContact::from_entities(e)?),
            A::DeleteContact => Self::DeleteContact(contact::target(e)?),

            A::CreateDeal => Self::CreateDeal(CreateDeal::from_entities(e)?),
            A::GetDeals => Self::GetDeals(DealQuery::from_entities(e)?),
            A::UpdateDeal => Self::UpdateDeal(UpdateDeal::from_entities(e)?),
            A::DeleteDeal => Self::DeleteDeal(deal::target(e)?),

            A::CreateProject => Self::CreateProject(CreateProject::from_entities(e)?),
            A::GetProjects => Self::GetProjects(ProjectQuery::from_entities(e)?),
            A::UpdateProject => Self::UpdateProject(UpdateProject::from_entities(e)?),
            A::DeleteProject => Self::DeleteProject(project::target(e)?),

            A::CreateTimeEntry => Self::CreateTimeEntry(CreateTimeEntry::from_entities(e)?),
            A::GetTimeEntries => Self::GetTimeEntries(TimeEntryQuery::from_entities(e)?),
            A::UpdateTimeEntry => Self::UpdateTimeEntry(UpdateTimeEntry::from_entities(e)?),
            A::DeleteTimeEntry => Self::DeleteTimeEntry(time_entry::target(e)?),

            A::Help => Self::Help(e.first_text(&["topic", "entity"])),
            A::Unknown => Self::Unknown,
        })
    }
}

//
// ================= Handlers =================
//

pub struct ActionHandlers {
    store: Arc<dyn RecordStore>,
    settings: HandlerSettings,
}

impl ActionHandlers {
    pub fn new(store: Arc<dyn RecordStore>, settings: HandlerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub async fn handle(&self, command: Command) -> Result<ExecutionResult> {
        match command {
            Command::CreateCompany(args) => self.create_company(args).await,
            Command::GetCompanies(query) => self.get_companies(query).await,
            Command::UpdateCompany(args) => self.update_company(args).await,
            Command::DeleteCompany(target) => self.delete_company(target).await,

            Command::CreateContact(args) => self.create_contact(args).await,
            Command::GetContacts(query) => self.get_contacts(query).await,
            Command::UpdateContact(args) => self.update_contact(args).await,
            Command::DeleteContact(target) => self.delete_contact(target).await,

            Command::CreateDeal(args) => self.create_deal(args).await,
            Command::GetDeals(query) => self.get_deals(query).await,
            Command::UpdateDeal(args) => self.update_deal(args).await,
            Command::DeleteDeal(target) => self.delete_deal(target).await,

            Command::CreateProject(args) => self.create_project(args).await,
            Command::GetProjects(query) => self.get_projects(query).await,
            Command::UpdateProject(args) => self.update_project(args).await,
            Command::DeleteProject(target) => self.delete_project(target).await,

            Command::CreateTimeEntry(args) => self.create_time_entry(args).await,
            Command::GetTimeEntries(query) => self.get_time_entries(query).await,
            Command::UpdateTimeEntry(args) => self.update_time_entry(args).await,
            Command::DeleteTimeEntry(target) => self.delete_time_entry(target).await,

            Command::Help(topic) => Ok(help::lookup(topic.as_deref())),
            Command::Unknown => Ok(ExecutionResult::not_understood()),
        }
    }

    /// Company reference for a write. An explicit id wins; otherwise the
    /// name is resolved. A miss, or a store failure during the lookup,
    /// degrades to no reference.
    pub(crate) async fn company_ref(
        &self,
        explicit: Option<Uuid>,
        name: Option<&str>,
    ) -> Result<Option<Uuid>> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        let Some(name) = name else {
            return Ok(None);
        };

        let resolved = lenient(
            EntityKind::Company,
            name,
            EntityResolver::resolve_company(self.store(), name).await,
        )?;
        if resolved.is_none() {
            info!(company_name = %name, "Company not resolved, continuing without reference");
        }
        Ok(resolved)
    }

    /// Company scope for a read. `Some(None)` means a name was given but
    /// matched nothing, so the filtered result is empty.
    pub(crate) async fn company_scope(
        &self,
        explicit: Option<Uuid>,
        name: Option<&str>,
    ) -> Result<Option<Option<Uuid>>> {
        match (explicit, name) {
            (Some(id), _) => Ok(Some(Some(id))),
            (None, Some(name)) => Ok(Some(EntityResolver::resolve_company(self.store(), name).await?)),
            (None, None) => Ok(None),
        }
    }
}

/// Write-side resolution outcome: store failures become a miss.
pub(crate) fn lenient(
    kind: EntityKind,
    name: &str,
    resolved: Result<Option<Uuid>>,
) -> Result<Option<Uuid>> {
    match resolved {
        Err(EngineError::Store(e)) => {
            warn!(%kind, name = %name, error = %e, "Lookup failed, continuing without reference");
            Ok(None)
        }
        other => other,
    }
}

/// Appended to a write's message when a linked name matched nothing.
pub(crate) fn unresolved_note(link: EntityKind, name: &str) -> String {
    format!(
        " I couldn't find a {} matching '{}', so that link was left unchanged.",
        link, name
    )
}

/// The update's only change was a link whose name matched nothing.
pub(crate) fn nothing_to_update(record: EntityKind, link: EntityKind, name: &str) -> EngineError {
    EngineError::not_found(format!(
        "I couldn't find a {} matching '{}', so the {} was not changed.",
        link, name, record
    ))
}

/// Find the record `target` points at; names match by case-insensitive
/// substring, first in store order.
pub(crate) async fn locate<T: Record>(
    collection: &dyn Collection<T>,
    target: &RecordRef,
    name_of: impl Fn(&T) -> String,
) -> Result<T> {
    let found = match target {
        RecordRef::Id(id) => collection.get(*id).await?,
        RecordRef::Name(name) => collection
            .list()
            .await?
            .into_iter()
            .find(|record| contains_ci(&name_of(record), name)),
    };

    debug!(kind = %T::KIND, ?target, found = found.is_some(), "Record lookup");

    found.ok_or_else(|| match target {
        RecordRef::Id(id) => EngineError::not_found(format!("No {} with id {}.", T::KIND, id)),
        RecordRef::Name(name) => {
            EngineError::not_found(format!("No {} matching '{}'.", T::KIND, name))
        }
    })
}

/// Locate then delete.
pub(crate) async fn remove<T: Record>(
    collection: &dyn Collection<T>,
    target: &RecordRef,
    name_of: impl Fn(&T) -> String,
) -> Result<T> {
    let record = locate(collection, target, name_of).await?;
    if !collection.delete(record.id()).await? {
        return Err(EngineError::not_found(format!(
            "The {} was already removed.",
            T::KIND
        )));
    }
    Ok(record)
}

/// Locate then patch.
pub(crate) async fn patch<T: Record>(
    collection: &dyn Collection<T>,
    target: &RecordRef,
    name_of: impl Fn(&T) -> String,
    changes: T::Patch,
) -> Result<T> {
    let record = locate(collection, target, name_of).await?;
    collection
        .update(record.id(), changes)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("The {} no longer exists.", T::KIND)))
}

pub(crate) fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {}", one)
    } else {
        format!("{} {}", count, many)
    }
}

pub(crate) fn money(value: f64, currency: &str) -> String {
    format!("{} {:.2}", currency, value)
}
