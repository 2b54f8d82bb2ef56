use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ledgerscan_core::{Notice, Session, Transaction, TransactionType};
use ledgerscan_export::ExportArtifact;
use ledgerscan_extract::{Extractor, ImagePayload};
use rust_decimal::Decimal;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{lock, AppState, InFlight, SharedSession};

// ── Views ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct NoticeView {
    pub kind: &'static str,
    pub message: String,
    pub is_error: bool,
}

impl From<&Notice> for NoticeView {
    fn from(notice: &Notice) -> Self {
        let kind = match notice {
            Notice::NoTransactions => "no_transactions",
            Notice::ExtractionFailed(_) => "extraction_failed",
        };
        NoticeView {
            kind,
            message: notice.message().to_string(),
            is_error: notice.is_error(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub busy: bool,
    pub count: usize,
    pub notice: Option<NoticeView>,
}

impl SessionView {
    fn new(id: Uuid, session: &Session) -> Self {
        SessionView {
            id,
            busy: session.is_busy(),
            count: session.count(),
            notice: session.notice().map(NoticeView::from),
        }
    }
}

/// One stored row as the API reports it. `amount` is a JSON number.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub index: usize,
    pub date: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// `+12.30` / `-4.50`
    pub display_amount: String,
}

fn transaction_views(transactions: &[Transaction]) -> Vec<TransactionView> {
    transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| TransactionView {
            index,
            date: tx.date.to_string(),
            description: tx.description.clone(),
            amount: tx.amount.value(),
            kind: tx.kind,
            display_amount: tx.signed_display(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ExtractionView {
    pub transactions: Vec<TransactionView>,
    pub notice: Option<NoticeView>,
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router<E: Extractor + 'static>(state: AppState<E>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session::<E>))
        .route(
            "/sessions/{id}",
            get(session_status::<E>).delete(close_session::<E>),
        )
        .route("/sessions/{id}/extract", post(extract::<E>))
        .route(
            "/sessions/{id}/transactions",
            get(list_transactions::<E>).delete(reset_transactions::<E>),
        )
        .route(
            "/sessions/{id}/transactions/{index}",
            delete(remove_transaction::<E>),
        )
        .route("/sessions/{id}/export", get(export_csv::<E>))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn session_for<E>(state: &AppState<E>, id: Uuid) -> Result<SharedSession, ApiError> {
    state.sessions.get(id).ok_or(ApiError::SessionNotFound(id))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn create_session<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let id = state.sessions.create()?;
    Ok((StatusCode::CREATED, Json(SessionCreated { id })))
}

async fn session_status<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = session_for(&state, id)?;
    let view = SessionView::new(id, &lock(&session));
    Ok(Json(view))
}

async fn close_session<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

/// Body is the raw image; its `Content-Type` is passed on as the media type.
async fn extract<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExtractionView>, ApiError> {
    let session = session_for(&state, id)?;
    if body.is_empty() {
        return Err(ApiError::EmptyImage);
    }
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let image = ImagePayload::from_bytes(&body, media_type);

    let in_flight = InFlight::begin(session)?;
    tracing::info!(session = %id, image = %image.digest(), "extraction requested");

    match state.extractor.extract(&image).await {
        Ok(transactions) => {
            let view = in_flight.finish(|s, ticket| {
                let notice = s.complete_extraction(ticket, transactions)?;
                Ok(ExtractionView {
                    transactions: transaction_views(s.transactions()),
                    notice: notice.as_ref().map(NoticeView::from),
                })
            })?;
            Ok(Json(view))
        }
        Err(e) => {
            in_flight.finish(|s, ticket| s.fail_extraction(ticket, e.user_message()))?;
            Err(e.into())
        }
    }
}

async fn list_transactions<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    let session = session_for(&state, id)?;
    let views = transaction_views(lock(&session).transactions());
    Ok(Json(views))
}

async fn remove_transaction<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    let session = session_for(&state, id)?;
    let mut guard = lock(&session);
    let removed = guard.remove_at(index)?;
    tracing::info!(session = %id, index, date = %removed.date, "transaction removed");
    Ok(Json(transaction_views(guard.transactions())))
}

async fn reset_transactions<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = session_for(&state, id)?;
    lock(&session).reset();
    tracing::info!(session = %id, "session reset");
    Ok(StatusCode::NO_CONTENT)
}

async fn export_csv<E: Extractor + 'static>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = session_for(&state, id)?;
    let artifact = ExportArtifact::build_now(lock(&session).transactions())?;

    let Some(artifact) = artifact else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    tracing::info!(session = %id, file = %artifact.filename, "ledger exported");
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
