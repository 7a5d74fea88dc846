//! Contact actions

use super::filters::{company_matches, text_matches};
use super::{nothing_to_update, patch, plural, remove, unresolved_note, ActionHandlers, RecordRef};
use crate::error::EngineError;
use crate::intent::Entities;
use crate::models::{Contact, ContactPatch, EntityKind, NewContact};
use crate::result::ExecutionResult;
use crate::Result;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const FIRST_NAME_KEYS: &[&str] = &["contactFirstName", "firstName"];
const LAST_NAME_KEYS: &[&str] = &["contactLastName", "lastName"];

/// Contacts are addressed by id or by (partial) full name.
pub(crate) fn target(e: &Entities) -> Result<RecordRef> {
    if let Some(id) = e.id("contactId")? {
        return Ok(RecordRef::Id(id));
    }

    let joined = match (e.first_text(FIRST_NAME_KEYS), e.first_text(LAST_NAME_KEYS)) {
        (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
        (first, last) => first.or(last),
    };

    e.first_text(&["contactName", "name"])
        .or(joined)
        .map(RecordRef::Name)
        .ok_or_else(|| {
            EngineError::validation(format!(
                "Please tell me which {} you mean (by name or 'contactId').",
                EntityKind::Contact
            ))
        })
}

fn full_name(c: &Contact) -> String {
    c.full_name()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateContact {
    pub contact: NewContact,
    pub company_name: Option<String>,
}

impl CreateContact {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let first = e.first_text(FIRST_NAME_KEYS);
        let last = e.first_text(LAST_NAME_KEYS);

        let (Some(first_name), Some(last_name)) = (first, last) else {
            return Err(EngineError::validation(
                "Please provide the contact's first and last name (contactFirstName, contactLastName).",
            ));
        };

        Ok(Self {
            contact: NewContact {
                first_name,
                last_name,
                email: e.first_text(&["contactEmail", "email"]),
                phone: e.first_text(&["contactPhone", "phone"]),
                position: e.first_text(&["contactPosition", "position", "jobTitle"]),
                company_id: e.id("companyId")?,
                notes: e.text("notes"),
            },
            company_name: e.text("companyName"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactQuery {
    pub search: Option<String>,
    pub position: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
}

impl ContactQuery {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        Ok(Self {
            search: e.first_text(&[
                "search",
                "query",
                "contactName",
                "name",
                "contactFirstName",
                "contactLastName",
            ]),
            position: e.first_text(&["contactPosition", "position"]),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
        })
    }

    fn matches(&self, c: &Contact, scope: Option<Option<Uuid>>) -> bool {
        let name = c.full_name();
        text_matches(
            self.search.as_deref(),
            &[Some(&name), c.email.as_deref(), c.phone.as_deref()],
        ) && text_matches(self.position.as_deref(), &[c.position.as_deref()])
            && company_matches(scope, c.company_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateContact {
    pub target: RecordRef,
    pub changes: ContactPatch,
    pub company_name: Option<String>,
}

impl UpdateContact {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let target = target(e)?;
        let changes = ContactPatch {
            first_name: e.text("newFirstName"),
            last_name: e.text("newLastName"),
            email: e.first_text(&["contactEmail", "email"]),
            phone: e.first_text(&["contactPhone", "phone"]),
            position: e.first_text(&["contactPosition", "position", "jobTitle"]),
            company_id: e.id("companyId")?,
            notes: e.text("notes"),
        };
        let company_name = e.text("companyName").filter(|_| changes.company_id.is_none());

        if changes == ContactPatch::default() && company_name.is_none() {
            return Err(EngineError::validation(
                "Tell me what to change on the contact (e.g. email, phone, position, company).",
            ));
        }

        Ok(Self {
            target,
            changes,
            company_name,
        })
    }
}

impl ActionHandlers {
    pub(crate) async fn create_contact(&self, args: CreateContact) -> Result<ExecutionResult> {
        let mut contact = args.contact;
        contact.company_id = self
            .company_ref(contact.company_id, args.company_name.as_deref())
            .await?;

        let contact = self.store().contacts().create(contact).await?;
        info!(contact_id = %contact.id, company_id = ?contact.company_id, "Contact created");

        let mut message = format!("Added contact {}.", contact.full_name());
        match (contact.company_id, args.company_name.as_deref()) {
            (Some(_), Some(company)) => message.push_str(&format!(" Linked to {}.", company)),
            (None, Some(company)) => message.push_str(&format!(
                " I couldn't find a company matching '{}', so the contact isn't linked to one.",
                company
            )),
            _ => {}
        }

        Ok(ExecutionResult::ok(json!({ "contact": contact }), message))
    }

    pub(crate) async fn get_contacts(&self, query: ContactQuery) -> Result<ExecutionResult> {
        let scope = self
            .company_scope(query.company_id, query.company_name.as_deref())
            .await?;

        let contacts: Vec<Contact> = self
            .store()
            .contacts()
            .list()
            .await?
            .into_iter()
            .filter(|c| query.matches(c, scope))
            .collect();

        let message = format!("Found {}.", plural(contacts.len(), "contact", "contacts"));
        Ok(ExecutionResult::ok(
            json!({ "contacts": contacts, "count": contacts.len() }),
            message,
        ))
    }

    pub(crate) async fn update_contact(&self, args: UpdateContact) -> Result<ExecutionResult> {
        let mut changes = args.changes;
        let mut missed = None;
        if let Some(name) = args.company_name.as_deref() {
            changes.company_id = self.company_ref(None, Some(name)).await?;
            missed = changes.company_id.is_none().then_some(name);
        }
        if let Some(name) = missed.filter(|_| changes == ContactPatch::default()) {
            return Err(nothing_to_update(EntityKind::Contact, EntityKind::Company, name));
        }

        let contact = patch(self.store().contacts(), &args.target, full_name, changes).await?;
        info!(contact_id = %contact.id, "Contact updated");

        let mut message = format!("Updated contact {}.", contact.full_name());
        if let Some(name) = missed {
            message.push_str(&unresolved_note(EntityKind::Company, name));
        }
        Ok(ExecutionResult::ok(json!({ "contact": contact }), message))
    }

    pub(crate) async fn delete_contact(&self, target: RecordRef) -> Result<ExecutionResult> {
        let contact = remove(self.store().contacts(), &target, full_name).await?;
        info!(contact_id = %contact.id, "Contact deleted");

        let message = format!("Deleted contact {}.", contact.full_name());
        Ok(ExecutionResult::ok(json!({ "contact": contact }), message))
    }
}
