use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Day granularity used when a listing's posting time is shown.
pub const POSTED_DATE_FORMAT: &str = "%Y-%m-%d";

/// One row of the job board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobListing {
    pub id: u32,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub employment_type: String,
    /// Visa codes allowed to take the position, e.g. `F-2`.
    pub visa: Vec<String>,
    pub description: String,
    pub requirements: String,
    #[serde(rename = "posted", serialize_with = "serialize_posted_date")]
    pub posted_at: DateTime<Utc>,
    pub category: String,
}

impl JobListing {
    pub fn posted_date(&self) -> String {
        self.posted_at.format(POSTED_DATE_FORMAT).to_string()
    }

    pub fn accepts_visa(&self, code: &str) -> bool {
        self.visa.iter().any(|candidate| candidate == code)
    }
}

fn serialize_posted_date<S>(posted_at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&posted_at.format(POSTED_DATE_FORMAT))
}

/// Distinct values offered by each filter control, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Facets {
    pub locations: Vec<String>,
    pub categories: Vec<String>,
    pub employment_types: Vec<String>,
    pub visas: Vec<String>,
}
