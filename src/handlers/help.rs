//! Static help text. No store access.

use crate::result::ExecutionResult;
use serde_json::json;

const OVERVIEW: &str = "I can manage companies, contacts, deals, projects and time entries. \
Try \"create a company called Acme with a $50k deal\", \"show deals over 10k\", \
\"convert the Acme deal into a project\" or \"log 3 hours on Website Redesign\".";

const TOPICS: &[(&str, &str)] = &[
    (
        "company",
        "Companies: create (name, industry, website, email, phone, address; add dealTitle or \
         dealValue to open a first deal), list with a search term or industry, update or delete by name.",
    ),
    (
        "contact",
        "Contacts: create with first and last name, optionally email, phone, position and \
         company name; list by search term or company; update or delete by name.",
    ),
    (
        "deal",
        "Deals: create with a title and value (currency defaults to USD); list by stage, \
         company, value range (minValue/maxValue) or probability; update stage, value or \
         close date; delete by title.",
    ),
    (
        "project",
        "Projects: create with a name, revenue, resources and expenses, or from an existing \
         deal (the deal is then marked closed-won); budgets and margins are recalculated on \
         every change.",
    ),
    (
        "time",
        "Time entries: log hours against a project with a description and date; list by \
         project, company, date range or billable flag.",
    ),
];

pub fn lookup(topic: Option<&str>) -> ExecutionResult {
    let topic = topic.map(|t| t.trim().to_lowercase());

    let text = topic
        .as_deref()
        .and_then(|t| TOPICS.iter().find(|(key, _)| t.contains(key)))
        .map(|(_, text)| *text)
        .unwrap_or(OVERVIEW);

    ExecutionResult::ok(
        json!({
            "topics": TOPICS.iter().map(|(key, _)| *key).collect::<Vec<_>>(),
        }),
        text,
    )
}
