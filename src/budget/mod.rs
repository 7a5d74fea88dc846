//! Budget and margin calculation
//!
//! Pure and deterministic: no I/O, no errors for well-typed input.
//! Derived figures are always recomputed from the inputs as a whole,
//! never patched in place.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DEFAULT_CURRENCY;

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_period() -> String {
    "project".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Internal,
    External,
    Contractor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    #[default]
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    #[default]
    Planned,
    Approved,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResource {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub rate_type: RateType,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default)]
    pub daily_rate: Option<f64>,
    #[serde(default)]
    pub hours_allocated: f64,
    #[serde(default)]
    pub days_allocated: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExpense {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub planned_cost: f64,
    #[serde(default)]
    pub actual_cost: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub status: ExpenseStatus,
    #[serde(default)]
    pub vendor: Option<String>,
}

/// Caller-supplied budget shape. Carries no derived figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInputs {
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub resources: Vec<ProjectResource>,
    #[serde(default)]
    pub expenses: Vec<ProjectExpense>,
    #[serde(default)]
    pub contingency_percentage: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for BudgetInputs {
    fn default() -> Self {
        Self {
            total_revenue: 0.0,
            resources: Vec::new(),
            expenses: Vec::new(),
            contingency_percentage: 0.0,
            currency: default_currency(),
        }
    }
}

/// Stored budget: the inputs plus every derived figure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBudget {
    pub total_revenue: f64,
    pub resources: Vec<ProjectResource>,
    pub expenses: Vec<ProjectExpense>,
    pub contingency_percentage: f64,
    pub currency: String,
    pub total_resource_cost: f64,
    pub total_expense_cost: f64,
    pub contingency_cost: f64,
    pub total_cost: f64,
    pub gross_margin: f64,
    pub margin_percentage: f64,
}

impl ProjectBudget {
    /// The mutable part of the budget, for recomputation after a change.
    pub fn inputs(&self) -> BudgetInputs {
        BudgetInputs {
            total_revenue: self.total_revenue,
            resources: self.resources.clone(),
            expenses: self.expenses.clone(),
            contingency_percentage: self.contingency_percentage,
            currency: self.currency.clone(),
        }
    }
}

/// Cost of a single resource. Daily pricing applies only when both the
/// daily rate and the day count are present.
pub fn resource_cost(resource: &ProjectResource) -> f64 {
    match (resource.rate_type, resource.daily_rate, resource.days_allocated) {
        (RateType::Daily, Some(rate), Some(days)) => rate * days,
        _ => resource.hourly_rate * resource.hours_allocated,
    }
}

pub struct BudgetEngine;

impl BudgetEngine {
    pub fn compute(inputs: BudgetInputs) -> ProjectBudget {
        let total_resource_cost: f64 = inputs.resources.iter().map(resource_cost).sum();
        let total_expense_cost: f64 = inputs.expenses.iter().map(|e| e.planned_cost).sum();

        let contingency_cost =
            (total_resource_cost + total_expense_cost) * inputs.contingency_percentage / 100.0;
        let total_cost = total_resource_cost + total_expense_cost + contingency_cost;
        let gross_margin = inputs.total_revenue - total_cost;

        let margin_percentage = if inputs.total_revenue > 0.0 {
            gross_margin / inputs.total_revenue * 100.0
        } else {
            0.0
        };

        ProjectBudget {
            total_revenue: inputs.total_revenue,
            resources: inputs.resources,
            expenses: inputs.expenses,
            contingency_percentage: inputs.contingency_percentage,
            currency: inputs.currency,
            total_resource_cost,
            total_expense_cost,
            contingency_cost,
            total_cost,
            gross_margin,
            margin_percentage,
        }
    }

    /// Empty budget used when a project is created from a deal.
    pub fn from_revenue(total_revenue: f64, currency: &str, contingency_percentage: f64) -> ProjectBudget {
        Self::compute(BudgetInputs {
            total_revenue,
            contingency_percentage,
            currency: currency.to_string(),
            ..BudgetInputs::default()
        })
    }
}
