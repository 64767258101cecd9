use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    ApplicationId, Caller, JobCompletion, JobFilter, JobId, JobSpec, NewUser, NotificationId,
    ProfileUpdate, Role,
};
use super::error::MarketplaceError;
use super::events::EventSink;
use super::notifications::NotificationRepository;
use super::store::{MarketplaceStore, StoreError};
use super::{ApplyOutcome, Marketplace};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type Shared<S, E, N> = Arc<Marketplace<S, E, N>>;

/// Router builder exposing the marketplace operations over HTTP.
///
/// The caller identity is taken as given from the `x-user-id` and `x-user-role` headers.
pub fn marketplace_router<S, E, N>(marketplace: Shared<S, E, N>) -> Router
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    Router::new()
        .route("/api/v1/users", post(register_handler::<S, E, N>))
        .route(
            "/api/v1/users/me",
            get(current_user_handler::<S, E, N>).put(update_profile_handler::<S, E, N>),
        )
        .route(
            "/api/v1/jobs",
            get(list_jobs_handler::<S, E, N>).post(post_job_handler::<S, E, N>),
        )
        .route("/api/v1/jobs/:job_id", get(job_handler::<S, E, N>))
        .route(
            "/api/v1/jobs/:job_id/complete",
            put(complete_job_handler::<S, E, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications",
            get(job_applications_handler::<S, E, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/mine",
            get(my_application_handler::<S, E, N>),
        )
        .route(
            "/api/v1/providers/me/jobs",
            get(provider_jobs_handler::<S, E, N>),
        )
        .route(
            "/api/v1/seekers/me/matching-jobs",
            get(matching_jobs_handler::<S, E, N>),
        )
        .route(
            "/api/v1/seekers/me/applications",
            get(seeker_applications_handler::<S, E, N>),
        )
        .route("/api/v1/applications", post(apply_handler::<S, E, N>))
        .route(
            "/api/v1/applications/:application_id/select",
            put(select_handler::<S, E, N>),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<S, E, N>),
        )
        .route(
            "/api/v1/notifications/read-all",
            put(mark_all_read_handler::<S, E, N>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            put(mark_read_handler::<S, E, N>),
        )
        .with_state(marketplace)
}

/// Reads the caller identity headers. Responds `401` when either is missing or unusable.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    match (user_id, role) {
        (Some(user_id), Some(role)) => Ok(Caller::new(user_id, role)),
        _ => {
            let payload = json!({
                "error": format!("{USER_ID_HEADER} and {USER_ROLE_HEADER} headers are required"),
            });
            Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, MarketplaceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

impl MarketplaceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketplaceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketplaceError::InvalidState(_) => StatusCode::CONFLICT,
            MarketplaceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketplaceError::Store(StoreError::Missing { .. }) => StatusCode::NOT_FOUND,
            MarketplaceError::Store(StoreError::Stale { .. } | StoreError::Conflict(_)) => {
                StatusCode::CONFLICT
            }
            MarketplaceError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "marketplace request failed");
        }
        let payload = json!({
            "error": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}

pub(crate) async fn register_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    Json(new_user): Json<NewUser>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    respond(StatusCode::CREATED, marketplace.users.register(new_user))
}

pub(crate) async fn current_user_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(StatusCode::OK, marketplace.users.current(&caller))
}

pub(crate) async fn update_profile_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace.users.update_profile(&caller, update),
    )
}

pub(crate) async fn list_jobs_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    Query(filter): Query<JobFilter>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    respond(StatusCode::OK, marketplace.jobs.list_jobs(&filter))
}

pub(crate) async fn post_job_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Json(spec): Json<JobSpec>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(StatusCode::CREATED, marketplace.jobs.post_job(&caller, spec))
}

pub(crate) async fn job_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    respond(StatusCode::OK, marketplace.jobs.job(&JobId(job_id)))
}

pub(crate) async fn complete_job_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(completion): Json<JobCompletion>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace
            .jobs
            .complete_job(&caller, &JobId(job_id), completion),
    )
}

pub(crate) async fn job_applications_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace
            .applications
            .applications_for_job(&caller, &JobId(job_id)),
    )
}

pub(crate) async fn my_application_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    let job_id = JobId(job_id);
    match marketplace.applications.my_application(&caller, &job_id) {
        Ok(Some(application)) => (StatusCode::OK, Json(application)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": format!("no application from '{}' for job '{}'", caller.user_id, job_id),
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn provider_jobs_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(StatusCode::OK, marketplace.jobs.list_provider_jobs(&caller))
}

pub(crate) async fn matching_jobs_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(StatusCode::OK, marketplace.jobs.list_matching_jobs(&caller))
}

pub(crate) async fn seeker_applications_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace
            .applications
            .applications_for_seeker(&caller, &caller.user_id),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplyRequest {
    job_id: String,
}

pub(crate) async fn apply_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Json(request): Json<ApplyRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    match marketplace
        .applications
        .apply_for_job(&caller, &JobId(request.job_id))
    {
        Ok(outcome @ ApplyOutcome::Created(_)) => {
            (StatusCode::CREATED, Json(outcome)).into_response()
        }
        Ok(outcome @ ApplyOutcome::Duplicate(_)) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn select_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace
            .applications
            .select_applicant(&caller, &ApplicationId(application_id)),
    )
}

pub(crate) async fn notifications_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    let feed = marketplace
        .notifications
        .list_for_user(&caller)
        .map(|notifications| {
            let unread = notifications.iter().filter(|entry| !entry.read).count();
            json!({
                "unread": unread,
                "notifications": notifications,
            })
        });
    respond(StatusCode::OK, feed)
}

pub(crate) async fn mark_read_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond(
        StatusCode::OK,
        marketplace
            .notifications
            .mark_read(&caller, &NotificationId(notification_id)),
    )
}

pub(crate) async fn mark_all_read_handler<S, E, N>(
    State(marketplace): State<Shared<S, E, N>>,
    headers: HeaderMap,
) -> Response
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    let marked = marketplace
        .notifications
        .mark_all_read(&caller)
        .map(|marked| json!({ "marked": marked }));
    respond(StatusCode::OK, marked)
}
