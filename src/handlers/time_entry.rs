//! Time entry actions

use super::filters::{company_matches, text_matches, DateRange, Range};
use super::{lenient, nothing_to_update, patch, plural, remove, unresolved_note, ActionHandlers, RecordRef};
use crate::error::EngineError;
use crate::intent::Entities;
use crate::models::{EntityKind, NewTimeEntry, TimeEntry, TimeEntryPatch};
use crate::resolver::EntityResolver;
use crate::result::ExecutionResult;
use crate::Result;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const DEFAULT_DESCRIPTION: &str = "Work logged";
const DESCRIPTION_KEYS: &[&str] = &["timeEntryDescription", "description"];
const HOURS_KEYS: &[&str] = &["hours", "duration"];

pub(crate) fn target(e: &Entities) -> Result<RecordRef> {
    RecordRef::from_entities(e, EntityKind::TimeEntry, "timeEntryId", DESCRIPTION_KEYS)
}

fn entry_description(t: &TimeEntry) -> String {
    t.description.clone()
}

fn hours(e: &Entities) -> Result<Option<f64>> {
    match e.first_number(HOURS_KEYS)? {
        Some(h) if h <= 0.0 => Err(EngineError::validation(format!(
            "Hours must be greater than zero, got {}.",
            h
        ))),
        other => Ok(other),
    }
}

fn hourly_rate(e: &Entities) -> Result<Option<f64>> {
    match e.first_number(&["hourlyRate", "rate"])? {
        Some(r) if r < 0.0 => Err(EngineError::validation("Hourly rate cannot be negative.")),
        other => Ok(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTimeEntry {
    pub hours: f64,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub billable: bool,
    pub hourly_rate: Option<f64>,
    pub project_id: Option<Uuid>,
    pub project_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
}

impl CreateTimeEntry {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let hours = hours(e)?
            .ok_or_else(|| EngineError::validation("Please tell me how many hours to log (hours)."))?;

        Ok(Self {
            hours,
            description: e.first_text(DESCRIPTION_KEYS),
            date: e.date("date")?,
            billable: e.flag("billable").unwrap_or(true),
            hourly_rate: hourly_rate(e)?,
            project_id: e.id("projectId")?,
            project_name: e.text("projectName"),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeEntryQuery {
    pub search: Option<String>,
    pub project_id: Option<Uuid>,
    pub project_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub billable: Option<bool>,
    pub hours: Range,
    pub dates: DateRange,
}

impl TimeEntryQuery {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let mut dates = DateRange::from_entities(e, "startDate", "endDate")?;
        if let Some(day) = e.date("date")? {
            dates = DateRange {
                from: Some(day),
                to: Some(day),
            };
        }

        Ok(Self {
            search: e.first_text(&["search", "query", "timeEntryDescription", "description"]),
            project_id: e.id("projectId")?,
            project_name: e.text("projectName"),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
            billable: e.flag("billable"),
            hours: Range::from_entities(e, "minHours", "maxHours")?,
            dates,
        })
    }

    fn matches(
        &self,
        t: &TimeEntry,
        company: Option<Option<Uuid>>,
        project: Option<Option<Uuid>>,
    ) -> bool {
        text_matches(self.search.as_deref(), &[Some(&t.description)])
            && company_matches(company, t.company_id)
            && company_matches(project, t.project_id)
            && self.billable.map_or(true, |b| t.billable == b)
            && self.hours.contains(t.hours)
            && self.dates.contains(t.date)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTimeEntry {
    pub target: RecordRef,
    pub changes: TimeEntryPatch,
    pub project_name: Option<String>,
}

impl UpdateTimeEntry {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let target = target(e)?;
        let changes = TimeEntryPatch {
            project_id: e.id("projectId")?,
            description: e.text("newDescription"),
            hours: hours(e)?,
            date: e.date("date")?,
            billable: e.flag("billable"),
            hourly_rate: hourly_rate(e)?,
        };
        let project_name = e.text("projectName").filter(|_| changes.project_id.is_none());

        if changes == TimeEntryPatch::default() && project_name.is_none() {
            return Err(EngineError::validation(
                "Tell me what to change on the time entry (e.g. hours, date, billable).",
            ));
        }

        Ok(Self {
            target,
            changes,
            project_name,
        })
    }
}

impl ActionHandlers {
    /// Project reference for a write; a miss or failed lookup degrades to
    /// no reference.
    async fn project_ref(&self, explicit: Option<Uuid>, name: Option<&str>) -> Result<Option<Uuid>> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        let Some(name) = name else {
            return Ok(None);
        };

        let resolved = lenient(
            EntityKind::Project,
            name,
            EntityResolver::resolve_project(self.store(), name).await,
        )?;
        if resolved.is_none() {
            info!(project_name = %name, "Project not resolved, continuing without reference");
        }
        Ok(resolved)
    }

    async fn project_scope(
        &self,
        explicit: Option<Uuid>,
        name: Option<&str>,
    ) -> Result<Option<Option<Uuid>>> {
        match (explicit, name) {
            (Some(id), _) => Ok(Some(Some(id))),
            (None, Some(name)) => Ok(Some(EntityResolver::resolve_project(self.store(), name).await?)),
            (None, None) => Ok(None),
        }
    }

    pub(crate) async fn create_time_entry(&self, args: CreateTimeEntry) -> Result<ExecutionResult> {
        let project_id = self
            .project_ref(args.project_id, args.project_name.as_deref())
            .await?;

        // An entry logged against a project inherits the project's company.
        let mut company_id = self
            .company_ref(args.company_id, args.company_name.as_deref())
            .await?;
        if company_id.is_none() {
            if let Some(id) = project_id {
                company_id = self.store().projects().get(id).await?.and_then(|p| p.company_id);
            }
        }

        let fields = NewTimeEntry {
            project_id,
            company_id,
            description: args
                .description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            hours: args.hours,
            date: args.date.unwrap_or_else(|| Utc::now().date_naive()),
            billable: args.billable,
            hourly_rate: args.hourly_rate,
        };

        let entry = self.store().time_entries().create(fields).await?;
        info!(time_entry_id = %entry.id, project_id = ?entry.project_id, hours = entry.hours, "Time logged");

        let mut message = format!(
            "Logged {} hours on {} ({}).",
            entry.hours,
            entry.date,
            if entry.billable { "billable" } else { "non-billable" }
        );
        if let (None, Some(name)) = (entry.project_id, args.project_name.as_deref()) {
            message.push_str(&format!(
                " I couldn't find a project matching '{}', so the entry isn't linked to one.",
                name
            ));
        }

        Ok(ExecutionResult::ok(json!({ "timeEntry": entry }), message))
    }

    pub(crate) async fn get_time_entries(&self, query: TimeEntryQuery) -> Result<ExecutionResult> {
        let company = self
            .company_scope(query.company_id, query.company_name.as_deref())
            .await?;
        let project = self
            .project_scope(query.project_id, query.project_name.as_deref())
            .await?;

        let entries: Vec<TimeEntry> = self
            .store()
            .time_entries()
            .list()
            .await?
            .into_iter()
            .filter(|t| query.matches(t, company, project))
            .collect();

        let total_hours: f64 = entries.iter().map(|t| t.hours).sum();
        let billable_hours: f64 = entries.iter().filter(|t| t.billable).map(|t| t.hours).sum();
        let billable_amount: f64 = entries
            .iter()
            .filter(|t| t.billable)
            .filter_map(|t| t.hourly_rate.map(|rate| rate * t.hours))
            .sum();

        let message = format!(
            "Found {} totalling {} hours ({} billable).",
            plural(entries.len(), "time entry", "time entries"),
            total_hours,
            billable_hours
        );

        Ok(ExecutionResult::ok(
            json!({
                "timeEntries": entries,
                "count": entries.len(),
                "totalHours": total_hours,
                "billableHours": billable_hours,
                "billableAmount": billable_amount,
            }),
            message,
        ))
    }

    pub(crate) async fn update_time_entry(&self, args: UpdateTimeEntry) -> Result<ExecutionResult> {
        let mut changes = args.changes;
        let mut missed = None;
        if let Some(name) = args.project_name.as_deref() {
            changes.project_id = self.project_ref(None, Some(name)).await?;
            missed = changes.project_id.is_none().then_some(name);
        }
        if let Some(name) = missed.filter(|_| changes == TimeEntryPatch::default()) {
            return Err(nothing_to_update(EntityKind::TimeEntry, EntityKind::Project, name));
        }

        let entry = patch(self.store().time_entries(), &args.target, entry_description, changes).await?;
        info!(time_entry_id = %entry.id, "Time entry updated");

        let mut message = format!(
            "Updated time entry '{}': {} hours on {}.",
            entry.description, entry.hours, entry.date
        );
        if let Some(name) = missed {
            message.push_str(&unresolved_note(EntityKind::Project, name));
        }
        Ok(ExecutionResult::ok(json!({ "timeEntry": entry }), message))
    }

    pub(crate) async fn delete_time_entry(&self, target: RecordRef) -> Result<ExecutionResult> {
        let entry = remove(self.store().time_entries(), &target, entry_description).await?;
        info!(time_entry_id = %entry.id, "Time entry deleted");

        let message = format!("Deleted time entry '{}'.", entry.description);
        Ok(ExecutionResult::ok(json!({ "timeEntry": entry }), message))
    }
}
