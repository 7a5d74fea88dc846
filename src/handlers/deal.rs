//! Deal actions

use super::filters::{company_matches, text_matches, Range};
use super::{money, nothing_to_update, patch, plural, remove, unresolved_note, ActionHandlers, RecordRef};
use crate::error::EngineError;
use crate::intent::Entities;
use crate::models::{Deal, DealPatch, DealStage, EntityKind, NewDeal};
use crate::result::ExecutionResult;
use crate::Result;
use chrono::NaiveDate;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const TITLE_KEYS: &[&str] = &["dealTitle", "title"];

pub(crate) fn target(e: &Entities) -> Result<RecordRef> {
    RecordRef::from_entities(e, EntityKind::Deal, "dealId", TITLE_KEYS)
}

pub(crate) fn deal_title(d: &Deal) -> String {
    d.title.clone()
}

pub(crate) fn stage(e: &Entities, key: &str) -> Result<Option<DealStage>> {
    match e.text(key) {
        Some(raw) => DealStage::parse(&raw).map(Some).ok_or_else(|| {
            EngineError::validation(format!(
                "Unknown deal stage '{}'. Use lead, qualified, proposal, negotiation, closed-won or closed-lost.",
                raw
            ))
        }),
        None => Ok(None),
    }
}

/// `dealStage`, falling back to `stage` only when `dealStage` is absent.
fn deal_stage(e: &Entities) -> Result<Option<DealStage>> {
    match stage(e, "dealStage")? {
        Some(found) => Ok(Some(found)),
        None => stage(e, "stage"),
    }
}

pub(crate) fn probability(e: &Entities, key: &str) -> Result<Option<u8>> {
    match e.number(key)? {
        Some(p) if (0.0..=100.0).contains(&p) => Ok(Some(p.round() as u8)),
        Some(p) => Err(EngineError::validation(format!(
            "Probability must be between 0 and 100, got {}.",
            p
        ))),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDeal {
    pub title: Option<String>,
    pub description: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub contact_id: Option<Uuid>,
    pub value: f64,
    pub currency: Option<String>,
    pub stage: DealStage,
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

impl CreateDeal {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let title = e.first_text(TITLE_KEYS);
        let company_name = e.text("companyName");

        if title.is_none() && company_name.is_none() {
            return Err(EngineError::validation(
                "Please provide a deal title (dealTitle) or the company it is for.",
            ));
        }

        let value = e.first_number(&["dealValue", "value", "amount"])?.unwrap_or(0.0);
        if value < 0.0 {
            return Err(EngineError::validation("Deal value cannot be negative."));
        }

        Ok(Self {
            title,
            description: e.first_text(&["dealDescription", "description"]),
            company_id: e.id("companyId")?,
            company_name,
            contact_id: e.id("contactId")?,
            value,
            currency: e.text("currency"),
            stage: deal_stage(e)?.unwrap_or_default(),
            probability: probability(e, "probability")?,
            expected_close_date: e.date("expectedCloseDate")?,
            tags: e.list("tags"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealQuery {
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub stage: Option<DealStage>,
    pub open: Option<bool>,
    pub value: Range,
    pub probability: Range,
}

impl DealQuery {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        Ok(Self {
            search: e.first_text(&["search", "query", "dealTitle", "title"]),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
            stage: deal_stage(e)?,
            open: e.flag("open"),
            value: Range::from_entities(e, "minValue", "maxValue")?,
            probability: Range::from_entities(e, "minProbability", "maxProbability")?,
        })
    }

    fn matches(&self, d: &Deal, scope: Option<Option<Uuid>>) -> bool {
        text_matches(
            self.search.as_deref(),
            &[Some(&d.title), d.description.as_deref()],
        ) && company_matches(scope, d.company_id)
            && self.stage.map_or(true, |s| d.stage == s)
            && self.open.map_or(true, |open| d.stage.is_open() == open)
            && self.value.contains(d.value)
            && self.probability.contains(f64::from(d.probability))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDeal {
    pub target: RecordRef,
    pub changes: DealPatch,
    pub company_name: Option<String>,
}

impl UpdateDeal {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let target = target(e)?;
        let new_stage = deal_stage(e)?;
        let explicit_probability = probability(e, "probability")?;

        let changes = DealPatch {
            title: e.first_text(&["newTitle", "newDealTitle"]),
            description: e.first_text(&["dealDescription", "description"]),
            company_id: e.id("companyId")?,
            value: e.first_number(&["dealValue", "value", "amount"])?,
            currency: e.text("currency"),
            stage: new_stage,
            probability: explicit_probability.or(new_stage.map(|s| s.default_probability())),
            expected_close_date: e.date("expectedCloseDate")?,
            project_id: None,
        };
        let company_name = e.text("companyName").filter(|_| changes.company_id.is_none());

        if changes == DealPatch::default() && company_name.is_none() {
            return Err(EngineError::validation(
                "Tell me what to change on the deal (e.g. stage, value, close date).",
            ));
        }
        if changes.value.is_some_and(|v| v < 0.0) {
            return Err(EngineError::validation("Deal value cannot be negative."));
        }

        Ok(Self {
            target,
            changes,
            company_name,
        })
    }
}

impl ActionHandlers {
    pub(crate) async fn create_deal(&self, args: CreateDeal) -> Result<ExecutionResult> {
        let company_id = self
            .company_ref(args.company_id, args.company_name.as_deref())
            .await?;

        let title = match (args.title, args.company_name.as_deref()) {
            (Some(title), _) => title,
            (None, Some(company)) => format!("{} Deal", company),
            (None, None) => "New Deal".to_string(),
        };

        let fields = NewDeal {
            title,
            description: args.description,
            company_id,
            contact_id: args.contact_id,
            value: args.value,
            currency: args
                .currency
                .unwrap_or_else(|| self.settings().default_currency.clone()),
            stage: args.stage,
            probability: args.probability.unwrap_or_else(|| args.stage.default_probability()),
            expected_close_date: args.expected_close_date,
            tags: args.tags,
        };

        let deal = self.store().deals().create(fields).await?;
        info!(deal_id = %deal.id, company_id = ?deal.company_id, "Deal created");

        let mut message = format!(
            "Created deal '{}' worth {} ({}).",
            deal.title,
            money(deal.value, &deal.currency),
            deal.stage
        );
        if deal.company_id.is_none() {
            if let Some(name) = &args.company_name {
                message.push_str(&format!(
                    " I couldn't find a company matching '{}', so it isn't linked to one.",
                    name
                ));
            }
        }

        Ok(ExecutionResult::ok(json!({ "deal": deal }), message))
    }

    pub(crate) async fn get_deals(&self, query: DealQuery) -> Result<ExecutionResult> {
        let scope = self
            .company_scope(query.company_id, query.company_name.as_deref())
            .await?;

        let deals: Vec<Deal> = self
            .store()
            .deals()
            .list()
            .await?
            .into_iter()
            .filter(|d| query.matches(d, scope))
            .collect();

        let total: f64 = deals.iter().map(|d| d.value).sum();
        let message = format!(
            "Found {} with a combined value of {:.2}.",
            plural(deals.len(), "deal", "deals"),
            total
        );

        Ok(ExecutionResult::ok(
            json!({ "deals": deals, "count": deals.len(), "totalValue": total }),
            message,
        ))
    }

    pub(crate) async fn update_deal(&self, args: UpdateDeal) -> Result<ExecutionResult> {
        let mut changes = args.changes;
        let mut missed = None;
        if let Some(name) = args.company_name.as_deref() {
            changes.company_id = self.company_ref(None, Some(name)).await?;
            missed = changes.company_id.is_none().then_some(name);
        }
        if let Some(name) = missed.filter(|_| changes == DealPatch::default()) {
            return Err(nothing_to_update(EntityKind::Deal, EntityKind::Company, name));
        }

        let deal = patch(self.store().deals(), &args.target, deal_title, changes).await?;
        info!(deal_id = %deal.id, stage = %deal.stage, "Deal updated");

        let mut message = format!(
            "Updated deal '{}': {} at {}% probability, worth {}.",
            deal.title,
            deal.stage,
            deal.probability,
            money(deal.value, &deal.currency)
        );
        if let Some(name) = missed {
            message.push_str(&unresolved_note(EntityKind::Company, name));
        }
        Ok(ExecutionResult::ok(json!({ "deal": deal }), message))
    }

    pub(crate) async fn delete_deal(&self, target: RecordRef) -> Result<ExecutionResult> {
        let deal = remove(self.store().deals(), &target, deal_title).await?;
        info!(deal_id = %deal.id, "Deal deleted");

        let message = format!("Deleted deal '{}'.", deal.title);
        Ok(ExecutionResult::ok(json!({ "deal": deal }), message))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{handlers, run};
    use crate::error::EngineError;
    use crate::intent::ActionTag;
    use crate::models::{DealStage, NewCompany};
    use crate::store::testing::ScriptedStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_deal_resolves_company() {
        let store = ScriptedStore::new();
        let acme = store
            .companies
            .seed(NewCompany {
                name: "Acme Industries".to_string(),
                ..NewCompany::default()
            })
            .await;
        let h = handlers(&store);

        let result = run(
            &h,
            ActionTag::CreateDeal,
            json!({ "dealTitle": "Renewal", "dealValue": "$12,500", "companyName": "acme" }),
        )
        .await
        .unwrap();

        assert!(result.success);
        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.company_id, Some(acme.id));
        assert_eq!(deal.value, 12_500.0);
        assert_eq!(deal.stage, DealStage::Lead);
        assert_eq!(deal.probability, 10);
    }

    #[tokio::test]
    async fn test_unresolved_company_still_creates_deal() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let result = run(
            &h,
            ActionTag::CreateDeal,
            json!({ "dealTitle": "Pilot", "dealValue": 5000, "companyName": "Nowhere" }),
        )
        .await
        .unwrap();

        assert!(result.success);
        assert!(result.message.unwrap().contains("isn't linked"));
        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.company_id, None);
    }

    #[tokio::test]
    async fn test_create_deal_requires_title_or_company() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let err = run(&h, ActionTag::CreateDeal, json!({ "dealValue": 100 }))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_deals_value_and_probability_ranges() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        for (title, value, stage) in [
            ("Small", 1_000, "lead"),
            ("Medium", 20_000, "proposal"),
            ("Large", 90_000, "negotiation"),
        ] {
            run(
                &h,
                ActionTag::CreateDeal,
                json!({ "dealTitle": title, "dealValue": value, "dealStage": stage }),
            )
            .await
            .unwrap();
        }

        let result = run(
            &h,
            ActionTag::GetDeals,
            json!({ "minValue": 10_000, "minProbability": 60 }),
        )
        .await
        .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["count"], 1);
        assert_eq!(data["deals"][0]["title"], "Large");
    }

    #[tokio::test]
    async fn test_get_open_deals() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        for (title, stage) in [("Won", "closed-won"), ("Live", "proposal"), ("Lost", "lost")] {
            run(&h, ActionTag::CreateDeal, json!({ "dealTitle": title, "dealStage": stage }))
                .await
                .unwrap();
        }

        let result = run(&h, ActionTag::GetDeals, json!({ "open": true }))
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["count"], 1);
        assert_eq!(data["deals"][0]["title"], "Live");
    }

    #[tokio::test]
    async fn test_get_deals_for_unknown_company_is_empty() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(&h, ActionTag::CreateDeal, json!({ "dealTitle": "Orphan" }))
            .await
            .unwrap();

        let result = run(&h, ActionTag::GetDeals, json!({ "companyName": "Ghost" }))
            .await
            .unwrap();

        assert_eq!(result.data.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn test_update_stage_sets_default_probability() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(&h, ActionTag::CreateDeal, json!({ "dealTitle": "Expansion" }))
            .await
            .unwrap();

        let result = run(
            &h,
            ActionTag::UpdateDeal,
            json!({ "dealTitle": "expansion", "dealStage": "negotiation" }),
        )
        .await
        .unwrap();

        assert!(result.success);
        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.stage, DealStage::Negotiation);
        assert_eq!(deal.probability, 75);
    }

    #[tokio::test]
    async fn test_invalid_stage_is_rejected_before_store() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let err = run(
            &h,
            ActionTag::UpdateDeal,
            json!({ "dealTitle": "x", "dealStage": "celebrating" }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_finite_value_rejected_before_store() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        for value in ["NaN", "inf", "1e400"] {
            let err = run(
                &h,
                ActionTag::CreateDeal,
                json!({ "dealTitle": "Overflow", "dealValue": value }),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_deal_stage_key_wins_over_stage() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        run(
            &h,
            ActionTag::CreateDeal,
            json!({ "dealTitle": "Renewal", "dealStage": "proposal", "stage": "celebrating" }),
        )
        .await
        .unwrap();
        assert_eq!(store.deals.snapshot().await[0].stage, DealStage::Proposal);

        let result = run(
            &h,
            ActionTag::GetDeals,
            json!({ "dealStage": "proposal", "stage": "whatever" }),
        )
        .await
        .unwrap();
        assert_eq!(result.data.unwrap()["count"], 1);

        let err = run(&h, ActionTag::CreateDeal, json!({ "dealTitle": "X", "stage": "celebrating" }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_with_only_unknown_company_changes_nothing() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(&h, ActionTag::CreateDeal, json!({ "dealTitle": "Expansion" }))
            .await
            .unwrap();

        let err = run(
            &h,
            ActionTag::UpdateDeal,
            json!({ "dealTitle": "expansion", "companyName": "Ghost" }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(store.deals.update_calls(), 0);

        let result = run(
            &h,
            ActionTag::UpdateDeal,
            json!({ "dealTitle": "expansion", "dealValue": 900, "companyName": "Ghost" }),
        )
        .await
        .unwrap();

        assert!(result.message.unwrap().contains("couldn't find a company matching 'Ghost'"));
        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.value, 900.0);
        assert_eq!(deal.company_id, None);
    }

    #[tokio::test]
    async fn test_delete_missing_deal_is_not_found() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let err = run(&h, ActionTag::DeleteDeal, json!({ "dealTitle": "ghost" }))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
