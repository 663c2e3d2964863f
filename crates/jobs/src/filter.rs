use std::collections::BTreeSet;

use serde::Deserialize;

use super::types::{Facets, JobListing};

/// Selector value that disables a single-choice control.
pub const ALL: &str = "All";

/// Filter selections. Every populated field narrows the result; the fields combine with AND.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    /// Case-insensitive substring over title, company or description.
    pub query: String,
    pub location: String,
    pub category: String,
    pub employment_type: String,
    /// Matches rows sharing at least one code with this selection.
    pub visas: Vec<String>,
}

impl JobFilter {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_employment_type(mut self, employment_type: impl Into<String>) -> Self {
        self.employment_type = employment_type.into();
        self
    }

    pub fn with_visas<I, S>(mut self, visas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visas = visas.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, listing: &JobListing) -> bool {
        self.matches_query(listing)
            && selector_matches(&self.location, &listing.location)
            && selector_matches(&self.category, &listing.category)
            && selector_matches(&self.employment_type, &listing.employment_type)
            && self.matches_visa(listing)
    }

    fn matches_query(&self, listing: &JobListing) -> bool {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        [&listing.title, &listing.company, &listing.description]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    fn matches_visa(&self, listing: &JobListing) -> bool {
        let mut selected = self
            .visas
            .iter()
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
            .peekable();
        if selected.peek().is_none() {
            return true;
        }

        selected.any(|code| listing.accepts_visa(code))
    }
}

fn selector_matches(selected: &str, value: &str) -> bool {
    let selected = selected.trim();
    selected.is_empty() || selected == ALL || selected == value
}

/// Rows accepted by `filter`, in dataset order.
pub fn filter_listings<'a>(listings: &'a [JobListing], filter: &JobFilter) -> Vec<&'a JobListing> {
    listings
        .iter()
        .filter(|listing| filter.matches(listing))
        .collect()
}

pub fn facets(listings: &[JobListing]) -> Facets {
    let mut locations = BTreeSet::new();
    let mut categories = BTreeSet::new();
    let mut employment_types = BTreeSet::new();
    let mut visas = BTreeSet::new();

    for listing in listings {
        locations.insert(listing.location.clone());
        categories.insert(listing.category.clone());
        employment_types.insert(listing.employment_type.clone());
        visas.extend(listing.visa.iter().cloned());
    }

    Facets {
        locations: locations.into_iter().collect(),
        categories: categories.into_iter().collect(),
        employment_types: employment_types.into_iter().collect(),
        visas: visas.into_iter().collect(),
    }
}
