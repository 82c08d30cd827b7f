use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::access::{AccessDecision, AccessGate, Role, Session};
use super::catalog::FormDefinition;
use super::domain::{ConsentState, FormId, SubmissionResult};
use super::flags::OneTimeFlagStore;
use super::mitigation::ClientTokenProvider;
use super::notify::Notification;
use super::relay::RelayTransport;
use super::repository::SubmissionLedger;
use super::service::{LeadSubmissionService, SubmissionError};
use super::session::FormSession;
use super::validation::FieldError;

/// Header carrying the identity resolved by the upstream session provider.
pub const SESSION_IDENTITY_HEADER: &str = "x-session-email";

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// Shared handler state: the submission service and the admin gate.
pub struct LeadApi<T, F, L> {
    pub service: Arc<LeadSubmissionService<T, F, L>>,
    pub access: Arc<dyn AccessGate>,
}

impl<T, F, L> Clone for LeadApi<T, F, L> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            access: Arc::clone(&self.access),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub consent: ConsentState,
    #[serde(default)]
    pub mitigation_token: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub form_id: FormId,
    pub result: SubmissionResult,
    pub notification: Notification,
    /// Values to render back; blank after a successful submission.
    pub fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// A missing `device_id` reads as blank and is refused by the handlers.
#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DismissRequest {
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Router builder exposing form schemas, submission, popup flags and the
/// admin submission history.
pub fn lead_router<T, F, L>(api: LeadApi<T, F, L>) -> Router
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    Router::new()
        .route("/api/v1/forms", get(list_forms_handler::<T, F, L>))
        .route(
            "/api/v1/forms/:form_id/submissions",
            post(submit_handler::<T, F, L>),
        )
        .route(
            "/api/v1/forms/:form_id/popup",
            get(popup_status_handler::<T, F, L>),
        )
        .route(
            "/api/v1/forms/:form_id/popup/dismiss",
            post(dismiss_popup_handler::<T, F, L>),
        )
        .route(
            "/api/v1/admin/submissions",
            get(submission_history_handler::<T, F, L>),
        )
        .with_state(api)
}

pub(crate) async fn list_forms_handler<T, F, L>(State(api): State<LeadApi<T, F, L>>) -> Response
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    (StatusCode::OK, Json(api.service.catalog().views())).into_response()
}

pub(crate) async fn submit_handler<T, F, L>(
    State(api): State<LeadApi<T, F, L>>,
    Path(form_id): Path<String>,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Response
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejected_body(rejection),
    };
    let Some(form) = api.service.form(&form_id) else {
        return unknown_form(&form_id);
    };

    let SubmissionRequest {
        fields,
        consent,
        mitigation_token,
        device_id,
    } = request;

    let mut session = FormSession::with_input(form.id.clone(), &form.schema, &fields, consent);
    let provider = ClientTokenProvider::new(mitigation_token);
    // a blank id would share one flag across every anonymous client
    let device_id = device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let result = api
        .service
        .run_submission(form, &mut session, &provider, device_id)
        .await;

    let (status, notification, errors) = match (&result, session.last_error()) {
        (SubmissionResult::Success, _) => (StatusCode::OK, form.success.clone(), Vec::new()),
        (_, Some(error)) => (
            failure_status(error),
            error.notification(),
            field_errors(error),
        ),
        (_, None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Notification::error("Error", "Submission did not complete."),
            Vec::new(),
        ),
    };

    let body = SubmissionResponse {
        form_id: form.id.clone(),
        result,
        notification,
        fields: session.values(),
        errors,
    };
    (status, Json(body)).into_response()
}

pub(crate) async fn popup_status_handler<T, F, L>(
    State(api): State<LeadApi<T, F, L>>,
    Path(form_id): Path<String>,
    Query(query): Query<DeviceQuery>,
) -> Response
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    let form = match prompt_form(&api, &form_id) {
        Ok(form) => form,
        Err(response) => return response,
    };
    let device_id = match required_device_id(&query.device_id) {
        Ok(device_id) => device_id,
        Err(response) => return response,
    };

    match api.service.should_prompt(form, device_id) {
        Ok(show) => (
            StatusCode::OK,
            Json(json!({ "form_id": form.id, "show": show })),
        )
            .into_response(),
        Err(err) => internal_error(err.to_string()),
    }
}

pub(crate) async fn dismiss_popup_handler<T, F, L>(
    State(api): State<LeadApi<T, F, L>>,
    Path(form_id): Path<String>,
    payload: Result<Json<DismissRequest>, JsonRejection>,
) -> Response
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejected_body(rejection),
    };
    let form = match prompt_form(&api, &form_id) {
        Ok(form) => form,
        Err(response) => return response,
    };
    let device_id = match required_device_id(&request.device_id) {
        Ok(device_id) => device_id,
        Err(response) => return response,
    };

    match api.service.dismiss_prompt(form, device_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => internal_error(err.to_string()),
    }
}

pub(crate) async fn submission_history_handler<T, F, L>(
    State(api): State<LeadApi<T, F, L>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    let session = headers
        .get(SESSION_IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
        .map(|identity| Session {
            identity: identity.to_string(),
        });

    match api.access.has_access(session.as_ref(), Role::Admin) {
        AccessDecision::Allowed => {}
        AccessDecision::Unauthenticated => {
            let payload = json!({ "error": "sign in required" });
            return (StatusCode::UNAUTHORIZED, Json(payload)).into_response();
        }
        AccessDecision::Forbidden => {
            let payload = json!({
                "error": "Access denied. Your account is not authorized to view this page.",
            });
            return (StatusCode::FORBIDDEN, Json(payload)).into_response();
        }
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    match api.service.recent_submissions(limit) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => internal_error(err.to_string()),
    }
}

fn prompt_form<'a, T, F, L>(
    api: &'a LeadApi<T, F, L>,
    form_id: &str,
) -> Result<&'a FormDefinition, Response>
where
    T: RelayTransport + 'static,
    F: OneTimeFlagStore + 'static,
    L: SubmissionLedger + 'static,
{
    let form = api
        .service
        .form(form_id)
        .ok_or_else(|| unknown_form(form_id))?;
    if form.one_time_flag.is_none() {
        let payload = json!({ "error": format!("form '{form_id}' has no one-time prompt") });
        return Err((StatusCode::NOT_FOUND, Json(payload)).into_response());
    }
    Ok(form)
}

fn required_device_id(raw: &str) -> Result<&str, Response> {
    let device_id = raw.trim();
    if device_id.is_empty() {
        let payload = json!({ "error": "device_id must not be blank" });
        return Err((StatusCode::BAD_REQUEST, Json(payload)).into_response());
    }
    Ok(device_id)
}

fn rejected_body(rejection: JsonRejection) -> Response {
    let payload = json!({ "error": rejection.body_text() });
    (rejection.status(), Json(payload)).into_response()
}

fn failure_status(error: &SubmissionError) -> StatusCode {
    match error {
        SubmissionError::Validation(_) | SubmissionError::ConsentRequired => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SubmissionError::MitigationRejected(_) => StatusCode::FORBIDDEN,
        SubmissionError::MitigationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SubmissionError::NetworkFailure(_) | SubmissionError::RelayRejected { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn field_errors(error: &SubmissionError) -> Vec<FieldError> {
    match error {
        SubmissionError::Validation(report) => report.errors().to_vec(),
        _ => Vec::new(),
    }
}

fn unknown_form(form_id: &str) -> Response {
    let payload = json!({ "error": format!("unknown form '{form_id}'") });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn internal_error(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
