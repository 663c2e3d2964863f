use axum::Json;
use axum::extract::{Path, Query, State};
use forfore_jobs::{Facets, JobFilter, JobListing, facets, filter_listings};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::chat::parse_session_id;
use super::error::ApiError;
use crate::chat::SavedJobs;

/// Query string of `GET /api/jobs`. `visa` is a comma-separated list of codes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobsQuery {
    pub q: String,
    pub location: String,
    pub category: String,
    pub employment_type: String,
    pub visa: String,
}

impl JobsQuery {
    pub fn into_filter(self) -> JobFilter {
        let visas = self
            .visa
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        JobFilter::default()
            .with_query(self.q)
            .with_location(self.location)
            .with_category(self.category)
            .with_employment_type(self.employment_type)
            .with_visas(visas)
    }
}

#[derive(Debug, Serialize)]
pub struct JobsResponse<'a> {
    pub total: usize,
    pub jobs: Vec<&'a JobListing>,
}

#[derive(Debug, Serialize)]
pub struct BookmarkResponse {
    pub job_id: u32,
    /// `false` when the action had already been recorded for this session.
    pub changed: bool,
}

pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Json<JobsResponse<'static>> {
    let filter = query.into_filter();
    let jobs = filter_listings(state.service.jobs(), &filter);
    tracing::debug!(filter = ?filter, total = jobs.len(), "filtered job listings");
    Json(JobsResponse {
        total: jobs.len(),
        jobs,
    })
}

pub(crate) async fn job_facets(State(state): State<AppState>) -> Json<Facets> {
    Json(facets(state.service.jobs()))
}

pub(crate) async fn save_job(
    State(state): State<AppState>,
    Path((session_id, job_id)): Path<(String, u32)>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let changed = state.service.save_job(session_id, job_id)?;
    Ok(Json(BookmarkResponse { job_id, changed }))
}

pub(crate) async fn apply_job(
    State(state): State<AppState>,
    Path((session_id, job_id)): Path<(String, u32)>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let changed = state.service.apply_job(session_id, job_id)?;
    Ok(Json(BookmarkResponse { job_id, changed }))
}

pub(crate) async fn saved_jobs(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SavedJobs>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.service.saved_jobs(session_id)?))
}
