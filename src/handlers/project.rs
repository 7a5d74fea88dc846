//! Project actions and deal conversion
//!
//! Every write that touches a budget input goes back through
//! [`BudgetEngine::compute`] so the stored derived figures always match the
//! stored inputs.

use super::filters::{company_matches, text_matches, Range};
use super::{
    deal, locate, money, nothing_to_update, plural, remove, unresolved_note, ActionHandlers, RecordRef,
};
use crate::budget::{BudgetEngine, BudgetInputs, ProjectBudget, ProjectExpense, ProjectResource};
use crate::error::EngineError;
use crate::intent::Entities;
use crate::models::{
    Deal, DealPatch, DealStage, EntityKind, NewProject, Project, ProjectPatch, ProjectStatus,
};
use crate::result::ExecutionResult;
use crate::saga::{FailurePolicy, Saga};
use crate::Result;
use chrono::NaiveDate;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const NAME_KEYS: &[&str] = &["projectName", "name"];

pub(crate) fn target(e: &Entities) -> Result<RecordRef> {
    RecordRef::from_entities(e, EntityKind::Project, "projectId", NAME_KEYS)
}

fn project_name(p: &Project) -> String {
    p.name.clone()
}

fn status(e: &Entities) -> Result<Option<ProjectStatus>> {
    match e.first_text(&["projectStatus", "status"]) {
        Some(raw) => ProjectStatus::parse(&raw).map(Some).ok_or_else(|| {
            EngineError::validation(format!(
                "Unknown project status '{}'. Use planning, active, on-hold, completed or cancelled.",
                raw
            ))
        }),
        None => Ok(None),
    }
}

fn revenue(e: &Entities) -> Result<Option<f64>> {
    match e.first_number(&["totalRevenue", "budget", "revenue"])? {
        Some(v) if v < 0.0 => Err(EngineError::validation("Project revenue cannot be negative.")),
        other => Ok(other),
    }
}

fn contingency(e: &Entities) -> Result<Option<f64>> {
    match e.number("contingencyPercentage")? {
        Some(p) if !(0.0..=100.0).contains(&p) => Err(EngineError::validation(format!(
            "Contingency must be between 0 and 100 percent, got {}.",
            p
        ))),
        other => Ok(other),
    }
}

fn budget_summary(budget: &ProjectBudget) -> String {
    format!(
        "Revenue {}, total cost {}, margin {} ({:.1}%).",
        money(budget.total_revenue, &budget.currency),
        money(budget.total_cost, &budget.currency),
        money(budget.gross_margin, &budget.currency),
        budget.margin_percentage
    )
}

//
// ================= Commands =================
//

#[derive(Debug, Clone, PartialEq)]
pub struct NewProjectArgs {
    pub name: String,
    pub description: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_revenue: f64,
    pub contingency_percentage: Option<f64>,
    pub currency: Option<String>,
    pub resources: Vec<ProjectResource>,
    pub expenses: Vec<ProjectExpense>,
    pub tags: Vec<String>,
}

/// A project either starts from scratch or is converted from a deal.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateProject {
    New(NewProjectArgs),
    FromDeal(RecordRef),
}

impl CreateProject {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        if e.has("dealId") || e.text("dealTitle").is_some() {
            return Ok(Self::FromDeal(deal::target(e)?));
        }

        let name = e.first_text(NAME_KEYS).ok_or_else(|| {
            EngineError::validation(
                "Please provide the project name (projectName), or the deal to convert (dealTitle).",
            )
        })?;

        let start_date = e.date("startDate")?;
        let end_date = e.date("endDate")?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(EngineError::validation("The end date is before the start date."));
            }
        }

        Ok(Self::New(NewProjectArgs {
            name,
            description: e.first_text(&["projectDescription", "description"]),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
            status: status(e)?.unwrap_or_default(),
            start_date,
            end_date,
            total_revenue: revenue(e)?.unwrap_or(0.0),
            contingency_percentage: contingency(e)?,
            currency: e.text("currency"),
            resources: e.nested("resources")?.unwrap_or_default(),
            expenses: e.nested("expenses")?.unwrap_or_default(),
            tags: e.list("tags"),
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectQuery {
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub status: Option<ProjectStatus>,
    pub revenue: Range,
}

impl ProjectQuery {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        Ok(Self {
            search: e.first_text(&["search", "query", "projectName", "name"]),
            company_id: e.id("companyId")?,
            company_name: e.text("companyName"),
            status: status(e)?,
            revenue: Range::from_entities(e, "minValue", "maxValue")?,
        })
    }

    fn matches(&self, p: &Project, scope: Option<Option<Uuid>>) -> bool {
        text_matches(
            self.search.as_deref(),
            &[Some(&p.name), p.description.as_deref()],
        ) && company_matches(scope, p.company_id)
            && self.status.map_or(true, |s| p.status == s)
            && self.revenue.contains(p.budget.total_revenue)
    }
}

/// Changes to budget inputs. Any of them forces a recompute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetChanges {
    pub total_revenue: Option<f64>,
    pub contingency_percentage: Option<f64>,
    pub currency: Option<String>,
    pub resources: Option<Vec<ProjectResource>>,
    pub expenses: Option<Vec<ProjectExpense>>,
    pub add_resource: Option<ProjectResource>,
    pub add_expense: Option<ProjectExpense>,
}

impl BudgetChanges {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply(self, mut inputs: BudgetInputs) -> BudgetInputs {
        if let Some(revenue) = self.total_revenue {
            inputs.total_revenue = revenue;
        }
        if let Some(contingency) = self.contingency_percentage {
            inputs.contingency_percentage = contingency;
        }
        if let Some(currency) = self.currency {
            inputs.currency = currency;
        }
        if let Some(resources) = self.resources {
            inputs.resources = resources;
        }
        if let Some(expenses) = self.expenses {
            inputs.expenses = expenses;
        }
        inputs.resources.extend(self.add_resource);
        inputs.expenses.extend(self.add_expense);
        inputs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProject {
    pub target: RecordRef,
    pub changes: ProjectPatch,
    pub budget: BudgetChanges,
    pub company_name: Option<String>,
}

impl UpdateProject {
    pub fn from_entities(e: &Entities) -> Result<Self> {
        let target = target(e)?;
        let changes = ProjectPatch {
            name: e.first_text(&["newName", "newProjectName"]),
            description: e.first_text(&["projectDescription", "description"]),
            company_id: e.id("companyId")?,
            status: status(e)?,
            start_date: e.date("startDate")?,
            end_date: e.date("endDate")?,
            budget: None,
        };
        let budget = BudgetChanges {
            total_revenue: revenue(e)?,
            contingency_percentage: contingency(e)?,
            currency: e.text("currency"),
            resources: e.nested("resources")?,
            expenses: e.nested("expenses")?,
            add_resource: e.nested("resource")?,
            add_expense: e.nested("expense")?,
        };
        let company_name = e.text("companyName").filter(|_| changes.company_id.is_none());

        if changes == ProjectPatch::default() && budget.is_empty() && company_name.is_none() {
            return Err(EngineError::validation(
                "Tell me what to change on the project (e.g. status, dates, revenue, a resource or an expense).",
            ));
        }

        Ok(Self {
            target,
            changes,
            budget,
            company_name,
        })
    }
}

//
// ================= Handlers =================
//

impl ActionHandlers {
    pub(crate) async fn create_project(&self, args: CreateProject) -> Result<ExecutionResult> {
        match args {
            CreateProject::FromDeal(target) => self.convert_deal_to_project(&target).await,
            CreateProject::New(args) => self.create_new_project(args).await,
        }
    }

    async fn create_new_project(&self, args: NewProjectArgs) -> Result<ExecutionResult> {
        let company_id = self
            .company_ref(args.company_id, args.company_name.as_deref())
            .await?;

        let budget = BudgetEngine::compute(BudgetInputs {
            total_revenue: args.total_revenue,
            resources: args.resources,
            expenses: args.expenses,
            contingency_percentage: args
                .contingency_percentage
                .unwrap_or(self.settings().default_contingency_percentage),
            currency: args
                .currency
                .unwrap_or_else(|| self.settings().default_currency.clone()),
        });

        let fields = NewProject {
            name: args.name,
            description: args.description,
            company_id,
            deal_id: None,
            status: args.status,
            start_date: args.start_date,
            end_date: args.end_date,
            budget,
            tags: args.tags,
        };

        let project = self.store().projects().create(fields).await?;
        info!(
            project_id = %project.id,
            margin = project.budget.gross_margin,
            "Project created"
        );

        let message = format!(
            "Created project '{}'. {}",
            project.name,
            budget_summary(&project.budget)
        );
        Ok(ExecutionResult::ok(json!({ "project": project }), message))
    }

    /// Create a project from a deal, then close the deal as won and link it.
    ///
    /// The deal is only touched after the project exists. If linking the
    /// deal fails the action fails, and the error says the project was
    /// already created.
    pub async fn convert_deal_to_project(&self, target: &RecordRef) -> Result<ExecutionResult> {
        let deal: Deal = locate(self.store().deals(), target, deal::deal_title).await?;
        if let Some(project_id) = deal.project_id {
            return Err(EngineError::validation(format!(
                "Deal '{}' was already converted to project {}.",
                deal.title, project_id
            )));
        }
        if deal.stage == DealStage::ClosedLost {
            return Err(EngineError::validation(format!(
                "Deal '{}' is closed-lost and cannot become a project.",
                deal.title
            )));
        }

        let fields = NewProject {
            name: deal.title.clone(),
            description: deal.description.clone(),
            company_id: deal.company_id,
            deal_id: Some(deal.id),
            status: ProjectStatus::Planning,
            start_date: None,
            end_date: None,
            budget: BudgetEngine::from_revenue(
                deal.value,
                &deal.currency,
                self.settings().default_contingency_percentage,
            ),
            tags: deal.tags.clone(),
        };

        let saga = Saga::new("project creation").then("deal close-out", FailurePolicy::AbortAll);
        let deals = self.store().deals();
        let deal_id = deal.id;

        let outcome = saga
            .run(self.store().projects().create(fields), |project: &Project| {
                let close_out = DealPatch {
                    stage: Some(DealStage::ClosedWon),
                    probability: Some(DealStage::ClosedWon.default_probability()),
                    project_id: Some(project.id),
                    ..DealPatch::default()
                };
                Some(async move {
                    deals.update(deal_id, close_out).await?.ok_or_else(|| {
                        EngineError::not_found("The deal disappeared before it could be closed.")
                    })
                })
            })
            .await?;

        let project = outcome.primary;
        let deal = outcome.secondary.completed().cloned().unwrap_or(deal);
        info!(project_id = %project.id, deal_id = %deal.id, "Deal converted to project");

        let message = format!(
            "Converted deal '{}' into project '{}' and marked the deal {}. {}",
            deal.title,
            project.name,
            deal.stage,
            budget_summary(&project.budget)
        );
        Ok(ExecutionResult::ok(
            json!({ "project": project, "deal": deal }),
            message,
        ))
    }

    pub(crate) async fn get_projects(&self, query: ProjectQuery) -> Result<ExecutionResult> {
        let scope = self
            .company_scope(query.company_id, query.company_name.as_deref())
            .await?;

        let projects: Vec<Project> = self
            .store()
            .projects()
            .list()
            .await?
            .into_iter()
            .filter(|p| query.matches(p, scope))
            .collect();

        let revenue: f64 = projects.iter().map(|p| p.budget.total_revenue).sum();
        let margin: f64 = projects.iter().map(|p| p.budget.gross_margin).sum();
        let message = format!(
            "Found {} with {:.2} revenue and {:.2} gross margin in total.",
            plural(projects.len(), "project", "projects"),
            revenue,
            margin
        );

        Ok(ExecutionResult::ok(
            json!({
                "projects": projects,
                "count": projects.len(),
                "totalRevenue": revenue,
                "totalMargin": margin,
            }),
            message,
        ))
    }

    pub(crate) async fn update_project(&self, args: UpdateProject) -> Result<ExecutionResult> {
        let mut changes = args.changes;
        let mut missed = None;
        if let Some(name) = args.company_name.as_deref() {
            changes.company_id = self.company_ref(None, Some(name)).await?;
            missed = changes.company_id.is_none().then_some(name);
        }
        let unchanged = changes == ProjectPatch::default() && args.budget.is_empty();
        if let Some(name) = missed.filter(|_| unchanged) {
            return Err(nothing_to_update(EntityKind::Project, EntityKind::Company, name));
        }

        let projects = self.store().projects();
        let current = locate(projects, &args.target, project_name).await?;

        let recomputed = !args.budget.is_empty();
        if recomputed {
            let inputs = args.budget.apply(current.budget.inputs());
            changes.budget = Some(BudgetEngine::compute(inputs));
        }

        let project = projects
            .update(current.id, changes)
            .await?
            .ok_or_else(|| EngineError::not_found("The project no longer exists."))?;
        info!(project_id = %project.id, recomputed, "Project updated");

        let mut message = format!("Updated project '{}'.", project.name);
        if recomputed {
            message.push(' ');
            message.push_str(&budget_summary(&project.budget));
        }
        if let Some(name) = missed {
            message.push_str(&unresolved_note(EntityKind::Company, name));
        }
        Ok(ExecutionResult::ok(json!({ "project": project }), message))
    }

    pub(crate) async fn delete_project(&self, target: RecordRef) -> Result<ExecutionResult> {
        let project = remove(self.store().projects(), &target, project_name).await?;
        info!(project_id = %project.id, "Project deleted");

        let message = format!("Deleted project '{}'.", project.name);
        Ok(ExecutionResult::ok(json!({ "project": project }), message))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{handlers, run};
    use super::super::RecordRef;
    use crate::error::EngineError;
    use crate::intent::ActionTag;
    use crate::models::{DealStage, NewDeal};
    use crate::store::testing::ScriptedStore;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn negotiation_deal() -> NewDeal {
        NewDeal {
            title: "Website Redesign".to_string(),
            description: Some("Full rebuild".to_string()),
            company_id: None,
            contact_id: None,
            value: 20_000.0,
            currency: "EUR".to_string(),
            stage: DealStage::Negotiation,
            probability: 75,
            expected_close_date: None,
            tags: vec!["web".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_project_computes_budget() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let result = run(
            &h,
            ActionTag::CreateProject,
            json!({
                "projectName": "Migration",
                "totalRevenue": 1000,
                "contingencyPercentage": 10,
                "resources": [{ "name": "Dev", "hourlyRate": 50, "hoursAllocated": 10 }],
                "expenses": [{ "category": "hosting", "plannedCost": 100, "actualCost": 999 }]
            }),
        )
        .await
        .unwrap();

        assert!(result.success);
        let project = &store.projects.snapshot().await[0];
        assert!(approx(project.budget.total_resource_cost, 500.0));
        assert!(approx(project.budget.total_expense_cost, 100.0));
        assert!(approx(project.budget.contingency_cost, 60.0));
        assert!(approx(project.budget.total_cost, 660.0));
        assert!(approx(project.budget.gross_margin, 340.0));
        assert!(approx(project.budget.margin_percentage, 34.0));
    }

    #[tokio::test]
    async fn test_create_project_uses_default_contingency() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        run(&h, ActionTag::CreateProject, json!({ "projectName": "Audit" }))
            .await
            .unwrap();

        let project = &store.projects.snapshot().await[0];
        assert!(approx(project.budget.contingency_percentage, 10.0));
        assert_eq!(project.budget.currency, "USD");
        assert!(approx(project.budget.margin_percentage, 0.0));
    }

    #[tokio::test]
    async fn test_create_project_requires_name() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let err = run(&h, ActionTag::CreateProject, json!({ "totalRevenue": 10 }))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_conversion_closes_deal_and_links_project() {
        let store = ScriptedStore::new();
        let deal = store.deals.seed(negotiation_deal()).await;
        let h = handlers(&store);

        let result = run(&h, ActionTag::CreateProject, json!({ "dealTitle": "redesign" }))
            .await
            .unwrap();
        assert!(result.success);

        let projects = store.projects.snapshot().await;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].deal_id, Some(deal.id));
        assert_eq!(projects[0].name, "Website Redesign");
        assert!(approx(projects[0].budget.total_revenue, 20_000.0));
        assert_eq!(projects[0].budget.currency, "EUR");
        assert_eq!(projects[0].tags, vec!["web".to_string()]);

        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.stage, DealStage::ClosedWon);
        assert_eq!(deal.probability, 100);
        assert_eq!(deal.project_id, Some(projects[0].id));
    }

    #[tokio::test]
    async fn test_failed_project_leaves_deal_untouched() {
        let store = ScriptedStore::new();
        let deal = store.deals.seed(negotiation_deal()).await;
        store.projects.fail_creates();
        let h = handlers(&store);

        let err = h
            .convert_deal_to_project(&RecordRef::Id(deal.id))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(store.deals.update_calls(), 0);
        let deal = &store.deals.snapshot().await[0];
        assert_eq!(deal.stage, DealStage::Negotiation);
        assert_eq!(deal.project_id, None);
    }

    #[tokio::test]
    async fn test_failed_close_out_reports_created_project() {
        let store = ScriptedStore::new();
        store.deals.seed(negotiation_deal()).await;
        store.deals.fail_updates();
        let h = handlers(&store);

        let err = run(&h, ActionTag::CreateProject, json!({ "dealTitle": "Website" }))
            .await
            .unwrap_err();

        match err {
            EngineError::SecondaryEffect(msg) => assert!(msg.contains("project creation succeeded")),
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(store.projects.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_converting_twice_is_rejected() {
        let store = ScriptedStore::new();
        store.deals.seed(negotiation_deal()).await;
        let h = handlers(&store);

        run(&h, ActionTag::CreateProject, json!({ "dealTitle": "Website" }))
            .await
            .unwrap();
        let err = run(&h, ActionTag::CreateProject, json!({ "dealTitle": "Website" }))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.projects.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_adding_resource_recomputes_budget() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(
            &h,
            ActionTag::CreateProject,
            json!({ "projectName": "Portal", "totalRevenue": 1000, "contingencyPercentage": 0 }),
        )
        .await
        .unwrap();

        run(
            &h,
            ActionTag::UpdateProject,
            json!({
                "projectName": "portal",
                "resource": { "name": "Designer", "rateType": "daily", "dailyRate": 400, "daysAllocated": 1 }
            }),
        )
        .await
        .unwrap();

        let project = &store.projects.snapshot().await[0];
        assert_eq!(project.budget.resources.len(), 1);
        assert!(approx(project.budget.total_cost, 400.0));
        assert!(approx(project.budget.gross_margin, 600.0));
        assert!(approx(project.budget.margin_percentage, 60.0));

        run(
            &h,
            ActionTag::UpdateProject,
            json!({ "projectName": "portal", "contingencyPercentage": 50 }),
        )
        .await
        .unwrap();

        let project = &store.projects.snapshot().await[0];
        assert!(approx(project.budget.contingency_cost, 200.0));
        assert!(approx(project.budget.gross_margin, 400.0));
    }

    #[tokio::test]
    async fn test_status_change_keeps_budget() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(
            &h,
            ActionTag::CreateProject,
            json!({ "projectName": "Portal", "totalRevenue": 800 }),
        )
        .await
        .unwrap();
        let before = store.projects.snapshot().await[0].budget.clone();

        run(
            &h,
            ActionTag::UpdateProject,
            json!({ "projectName": "Portal", "status": "active" }),
        )
        .await
        .unwrap();

        let project = &store.projects.snapshot().await[0];
        assert_eq!(project.status, crate::models::ProjectStatus::Active);
        assert_eq!(project.budget, before);
    }

    #[tokio::test]
    async fn test_non_finite_revenue_rejected_before_store() {
        let store = ScriptedStore::new();
        let h = handlers(&store);

        let err = run(
            &h,
            ActionTag::CreateProject,
            json!({ "projectName": "Moonshot", "totalRevenue": "inf" }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_with_only_unknown_company_changes_nothing() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        run(&h, ActionTag::CreateProject, json!({ "projectName": "Portal" }))
            .await
            .unwrap();

        let err = run(
            &h,
            ActionTag::UpdateProject,
            json!({ "projectName": "Portal", "companyName": "Ghost" }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(store.projects.update_calls(), 0);

        let result = run(
            &h,
            ActionTag::UpdateProject,
            json!({ "projectName": "Portal", "status": "active", "companyName": "Ghost" }),
        )
        .await
        .unwrap();

        assert!(result.message.unwrap().contains("couldn't find a company matching 'Ghost'"));
        let project = &store.projects.snapshot().await[0];
        assert_eq!(project.status, crate::models::ProjectStatus::Active);
        assert_eq!(project.company_id, None);
    }

    #[tokio::test]
    async fn test_get_projects_by_status_and_revenue() {
        let store = ScriptedStore::new();
        let h = handlers(&store);
        for (name, revenue, status) in [("A", 500, "active"), ("B", 5_000, "active"), ("C", 9_000, "planning")] {
            run(
                &h,
                ActionTag::CreateProject,
                json!({ "projectName": name, "totalRevenue": revenue, "status": status }),
            )
            .await
            .unwrap();
        }

        let result = run(
            &h,
            ActionTag::GetProjects,
            json!({ "status": "active", "minValue": 1000 }),
        )
        .await
        .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["count"], 1);
        assert_eq!(data["projects"][0]["name"], "B");
    }
}
