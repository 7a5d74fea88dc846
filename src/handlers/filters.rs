//! In-engine filtering for `get_*` actions
//!
//! The store only hands back full collections, so predicates run here.

use crate::intent::Entities;
use crate::resolver::contains_ci;
use crate::Result;
use chrono::NaiveDate;

/// Inclusive numeric range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    pub fn from_entities(entities: &Entities, min_key: &str, max_key: &str) -> Result<Self> {
        Ok(Self {
            min: entities.number(min_key)?,
            max: entities.number(max_key)?,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn from_entities(entities: &Entities, from_key: &str, to_key: &str) -> Result<Self> {
        Ok(Self {
            from: entities.date(from_key)?,
            to: entities.date(to_key)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// True when `needle` is absent or any of `fields` contains it.
pub fn text_matches(needle: Option<&str>, fields: &[Option<&str>]) -> bool {
    match needle {
        None => true,
        Some(needle) => fields.iter().flatten().any(|field| contains_ci(field, needle)),
    }
}

/// Company scope check. `None` scope means no company filter was given.
pub fn company_matches(scope: Option<Option<uuid::Uuid>>, company_id: Option<uuid::Uuid>) -> bool {
    match scope {
        None => true,
        Some(None) => false,
        Some(Some(wanted)) => company_id == Some(wanted),
    }
}
