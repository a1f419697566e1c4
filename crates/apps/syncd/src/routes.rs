//! HTTP routes of the sync service

use std::sync::Arc;

use ingest::{
    ConversationId, IngestError, MailStore, MessageFailure, ProviderConnector, SyncOptions,
    SyncReport, TenantId, TenantLocks, get_conversation_detail, list_conversations, sync_tenant,
};
use poem::http::StatusCode;
use poem::web::{Data, Json, Path, Query};
use poem::{Endpoint, EndpointExt, IntoResponse, Response, Route, get, handler, post};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Default page size of the conversation list
const DEFAULT_PAGE_SIZE: usize = 50;

/// Shared state of every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MailStore>,
    pub connector: Arc<dyn ProviderConnector>,
    pub options: SyncOptions,
    pub locks: TenantLocks,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MailStore>,
        connector: Arc<dyn ProviderConnector>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            connector,
            options,
            locks: TenantLocks::new(),
        }
    }
}

pub fn app(state: AppState) -> impl Endpoint {
    Route::new()
        .at("/health", get(health))
        .at("/api/email/sync", post(trigger_sync))
        .at("/api/conversations", get(conversations))
        .at("/api/conversations/:id", get(conversation_detail))
        .data(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    message: String,
    synced_conversations: usize,
    synced_messages: usize,
    skipped_outbound: usize,
    failures: Vec<MessageFailure>,
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            message: report.summary(),
            synced_conversations: report.synced_conversations,
            synced_messages: report.synced_messages,
            skipped_outbound: report.skipped_outbound,
            failures: report.failures,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn error_response(err: &IngestError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.to_string(),
        details: err.detail(),
    };
    Json(body).with_status(status).into_response()
}

fn internal_error(context: &str, detail: String) -> Response {
    log::error!("{}: {}", context, detail);
    Json(ErrorBody {
        error: context.to_string(),
        details: Some(detail),
    })
    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
    .into_response()
}

#[handler]
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Parse the trigger body; an empty body carries no tenant
fn parse_sync_request(body: &str) -> Result<SyncRequest, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(SyncRequest { user_id: None });
    }
    serde_json::from_str(body)
}

/// `POST /api/email/sync` with `{"userId": "..."}`
#[handler]
async fn trigger_sync(Data(state): Data<&AppState>, body: String) -> Response {
    let request = match parse_sync_request(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(ErrorBody {
                error: "invalid request body".to_string(),
                details: Some(e.to_string()),
            })
            .with_status(StatusCode::BAD_REQUEST)
            .into_response();
        }
    };

    let Some(tenant) = request.user_id.as_deref().and_then(TenantId::parse) else {
        return error_response(&IngestError::Unauthorized);
    };

    let Some(lease) = state.locks.try_acquire(&tenant) else {
        log::info!("[HTTP] Sync already running for tenant {}", tenant);
        return error_response(&IngestError::Busy(tenant));
    };

    let store = Arc::clone(&state.store);
    let connector = Arc::clone(&state.connector);
    let options = state.options.clone();

    let result = tokio::task::spawn_blocking(move || {
        let _lease = lease;
        sync_tenant(store.as_ref(), connector.as_ref(), &options, &tenant)
    })
    .await;

    match result {
        Ok(Ok(report)) => Json(SyncResponse::from(report)).into_response(),
        Ok(Err(err)) => {
            log::warn!("[HTTP] Sync failed: {}", err);
            error_response(&err)
        }
        Err(join_err) => internal_error("sync task failed", join_err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantQuery {
    user_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl TenantQuery {
    fn tenant(&self) -> Option<TenantId> {
        self.user_id.as_deref().and_then(TenantId::parse)
    }
}

/// `GET /api/conversations?userId=&limit=&offset=`
#[handler]
async fn conversations(
    Data(state): Data<&AppState>,
    Query(params): Query<TenantQuery>,
) -> Response {
    let Some(tenant) = params.tenant() else {
        return error_response(&IngestError::Unauthorized);
    };
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    let store = Arc::clone(&state.store);

    let result = tokio::task::spawn_blocking(move || {
        list_conversations(store.as_ref(), &tenant, limit, offset)
    })
    .await;

    match result {
        Ok(Ok(list)) => Json(json!({ "conversations": list })).into_response(),
        Ok(Err(err)) => internal_error("database error", format!("{:#}", err)),
        Err(join_err) => internal_error("query task failed", join_err.to_string()),
    }
}

/// `GET /api/conversations/:id?userId=`
#[handler]
async fn conversation_detail(
    Data(state): Data<&AppState>,
    Path(id): Path<String>,
    Query(params): Query<TenantQuery>,
) -> Response {
    let Some(tenant) = params.tenant() else {
        return error_response(&IngestError::Unauthorized);
    };
    let store = Arc::clone(&state.store);
    let id = ConversationId::new(id);

    let result = tokio::task::spawn_blocking(move || {
        get_conversation_detail(store.as_ref(), &tenant, &id)
    })
    .await;

    match result {
        Ok(Ok(Some(detail))) => Json(detail).into_response(),
        Ok(Ok(None)) => Json(json!({ "error": "conversation not found" }))
            .with_status(StatusCode::NOT_FOUND)
            .into_response(),
        Ok(Err(err)) => internal_error("database error", format!("{:#}", err)),
        Err(join_err) => internal_error("query task failed", join_err.to_string()),
    }
}
