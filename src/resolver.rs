//! Entity resolution for informally named references
//!
//! Names extracted from free text are approximate, so matching is a
//! case-insensitive substring test and the first match in store order wins.

use crate::models::{Company, Project};
use crate::store::RecordStore;
use crate::Result;
use tracing::debug;
use uuid::Uuid;

pub struct EntityResolver;

impl EntityResolver {
    /// Id of the first company whose name contains `fragment`.
    /// A miss is `None`, not an error.
    pub async fn resolve_company(store: &dyn RecordStore, fragment: &str) -> Result<Option<Uuid>> {
        Ok(Self::find_company(store, fragment).await?.map(|c| c.id))
    }

    pub async fn find_company(store: &dyn RecordStore, fragment: &str) -> Result<Option<Company>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let companies = store.companies().list().await?;
        let found = companies
            .into_iter()
            .find(|c| c.name.to_lowercase().contains(&needle));

        debug!(
            fragment = %fragment,
            resolved = ?found.as_ref().map(|c| c.id),
            "Company resolution"
        );

        Ok(found)
    }

    /// Same rule as companies, over project names.
    pub async fn resolve_project(store: &dyn RecordStore, fragment: &str) -> Result<Option<Uuid>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let found: Option<Project> = store
            .projects()
            .list()
            .await?
            .into_iter()
            .find(|p| p.name.to_lowercase().contains(&needle));

        debug!(fragment = %fragment, resolved = ?found.as_ref().map(|p| p.id), "Project resolution");
        Ok(found.map(|p| p.id))
    }
}

/// Case-insensitive substring test used by resolution and list filters.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCompany;
    use crate::store::testing::ScriptedStore;

    fn company(name: &str) -> NewCompany {
        NewCompany {
            name: name.to_string(),
            ..NewCompany::default()
        }
    }

    #[tokio::test]
    async fn test_resolves_substring_case_insensitively() {
        let store = ScriptedStore::new();
        let tech = store.companies.seed(company("TechCorp")).await;
        store.companies.seed(company("OtherCo")).await;

        let resolved = EntityResolver::resolve_company(store.as_ref(), "tech").await.unwrap();
        assert_eq!(resolved, Some(tech.id));
    }

    #[tokio::test]
    async fn test_miss_is_absent() {
        let store = ScriptedStore::new();
        store.companies.seed(company("OtherCo")).await;

        let resolved = EntityResolver::resolve_company(store.as_ref(), "tech").await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_first_match_in_store_order_wins() {
        let store = ScriptedStore::new();
        let first = store.companies.seed(company("Acme Labs")).await;
        store.companies.seed(company("Acme Holdings")).await;

        let resolved = EntityResolver::resolve_company(store.as_ref(), "ACME").await.unwrap();
        assert_eq!(resolved, Some(first.id));
    }

    #[tokio::test]
    async fn test_blank_fragment_skips_store() {
        let store = ScriptedStore::new();
        store.companies.seed(company("Acme")).await;

        let resolved = EntityResolver::resolve_company(store.as_ref(), "  ").await.unwrap();
        assert_eq!(resolved, None);
        assert_eq!(store.calls(), 0);
    }
}
