//! Company actions, including the company + first deal composite

use super::filters::text_matches;
use super::{deal, money, patch, plural, remove, ActionHandlers, RecordRef};
use crate::error::EngineError;
use crate::intent::Entities;
use crate::models::{Company, CompanyPatch, DealStage, EntityKind, NewCompany, NewDeal};
use crate::result::ExecutionResult;
use crate::saga::{FailurePolicy, Saga};
use crate::Result;
use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

const NAME_KEYS: &[&str] = &["companyName", "name"];

pub(crate) fn target(e: &Entities) -> Result<RecordRef> {
    RecordRef::from_entities(e, EntityKind::Company, "companyId", NAME_KEYS)
}

fn company_name(c: &Company) -> String {
    c.name.clone()
}

/// Deal-shaped entities that ride along with a company creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealSeed {
    pub title: Option<String>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl DealSeed {
    /// Present only when the intent carries `dealTitle` or `dealValue`.
    fn from_entities(e: &Entities) -> Result<Option<Self>> {
        let title = e.text("dealTitle");
        let value = e.number("dealValue")?;
        if title.is_none() && value.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            title,
            value,
            currency: e.text("currency"),
            stage: deal::stage(e, "dealStage")?,
            probability: deal::probability(e, "probability")?,
            expected_close_date: e.date("expectedCloseDate")?,
            description: e.text("dealDescription"),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCompany {
    pub company: NewCompany,
    pub deal: Option<DealSeed>,
}

impl CreateCompany {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let name = e.first_text(NAME_KEYS).ok_or_else(|| {
            EngineError::validation("Please provide the company name (companyName).")
        })?;

        Ok(Self {
            company: NewCompany {
                name,
                industry: e.text("industry"),
                website: e.text("website"),
                email: e.first_text(&["companyEmail", "email"]),
                phone: e.first_text(&["companyPhone", "phone"]),
                address: e.text("address"),
                notes: e.text("notes"),
            },
            deal: DealSeed::from_entities(e)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyQuery {
    pub search: Option<String>,
    pub industry: Option<String>,
}

impl CompanyQuery {
    pub fn from_entities(e: &Entities) -> Self {
        Self {
            search: e.first_text(&["search", "query", "companyName", "name"]),
            industry: e.text("industry"),
        }
    }

    fn matches(&self, c: &Company) -> bool {
        text_matches(
            self.search.as_deref(),
            &[Some(&c.name), c.industry.as_deref(), c.email.as_deref(), c.website.as_deref()],
        ) && text_matches(self.industry.as_deref(), &[c.industry.as_deref()])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCompany {
    pub target: RecordRef,
    pub changes: CompanyPatch,
}

impl UpdateCompany {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let target = target(e)?;
        let changes = CompanyPatch {
            name: e.first_text(&["newName", "newCompanyName"]),
            industry: e.text("industry"),
            website: e.text("website"),
            email: e.first_text(&["companyEmail", "email"]),
            phone: e.first_text(&["companyPhone", "phone"]),
            address: e.text("address"),
            notes: e.text("notes"),
        };

        if changes == CompanyPatch::default() {
            return Err(EngineError::validation(
                "Tell me what to change on the company (e.g. industry, website, phone).",
            ));
        }

        Ok(Self { target, changes })
    }
}

impl ActionHandlers {
    fn deal_from_seed(&self, seed: DealSeed, company: &Company) -> NewDeal {
        let stage = seed.stage.unwrap_or_default();
        NewDeal {
            title: seed.title.unwrap_or_else(|| format!("{} Deal", company.name)),
            description: seed.description,
            company_id: Some(company.id),
            contact_id: None,
            value: seed.value.unwrap_or(0.0),
            currency: seed
                .currency
                .unwrap_or_else(|| self.settings().default_currency.clone()),
            stage,
            probability: seed.probability.unwrap_or_else(|| stage.default_probability()),
            expected_close_date: seed.expected_close_date,
            tags: Vec::new(),
        }
    }

    pub(crate) async fn create_company(&self, args: CreateCompany) -> Result<ExecutionResult> {
        let CreateCompany { company, deal } = args;

        let saga = Saga::new("company creation")
            .then("first deal creation", FailurePolicy::ReportButContinue);

        let outcome = saga
            .run(self.store().companies().create(company), |created: &Company| {
                let fields = self.deal_from_seed(deal?, created);
                Some(self.store().deals().create(fields))
            })
            .await?;

        let company = outcome.primary;
        info!(company_id = %company.id, name = %company.name, "Company created");

        let mut message = format!("Created company '{}'.", company.name);
        if let Some(created) = outcome.secondary.completed() {
            message.push_str(&format!(
                " Also created deal '{}' worth {}.",
                created.title,
                money(created.value, &created.currency)
            ));
        }
        if let Some(reason) = outcome.secondary.failure() {
            message.push_str(&format!(
                " The company is saved, but I couldn't create its deal: {}",
                reason
            ));
        }

        Ok(ExecutionResult::ok(
            json!({
                "company": company,
                "deal": outcome.secondary.completed(),
                "secondaryError": outcome.secondary.failure(),
            }),
            message,
        ))
    }

    pub(crate) async fn get_companies(&self, query: CompanyQuery) -> Result<ExecutionResult> {
        let companies: Vec<Company> = self
            .store()
            .companies()
            .list()
            .await?
            .into_iter()
            .filter(|c| query.matches(c))
            .collect();

        let message = format!("Found {}.", plural(companies.len(), "company", "companies"));
        Ok(ExecutionResult::ok(
            json!({ "companies": companies, "count": companies.len() }),
            message,
        ))
    }

    pub(crate) async fn update_company(&self, args: UpdateCompany) -> Result<ExecutionResult> {
        let company = patch(self.store().companies(), &args.target, company_name, args.changes).await?;
        info!(company_id = %company.id, "Company updated");

        let message = format!("Updated company '{}'.", company.name);
        Ok(ExecutionResult::ok(json!({ "company": company }), message))
    }

    pub(crate) async fn delete_company(&self, target: RecordRef) -> Result<ExecutionResult> {
        let company = remove(self.store().companies(), &target, company_name).await?;
        info!(company_id = %company.id, "Company deleted");

        let message = format!("Deleted company '{}'.", company.name);
        Ok(ExecutionResult::ok(json!({ "company": company }), message))
    }
}
