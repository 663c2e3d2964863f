mod dataset;
mod filter;
mod types;

pub use dataset::{build_dataset, dataset, find_listing};
pub use filter::{ALL, JobFilter, facets, filter_listings};
pub use types::{Facets, JobListing, POSTED_DATE_FORMAT};
