//! Quote collection routes.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use quotesync_engine::Record;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::notify::{Notifier, IMPORT_FAILED_NOTICE, IMPORT_OK_NOTICE, LOCAL_ADD_NOTICE};
use crate::{with_store, AppState};

/// Create quote routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quotes", get(list_quotes).post(add_quote))
        .route("/quotes/random", get(random_quote))
        .route("/categories", get(list_categories))
        .route("/filter", put(set_filter))
        .route("/export", get(export_quotes))
        .route("/import", post(import_quotes))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Category to show; falls back to the persisted filter while it still matches
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewQuote {
    pub text: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
    pub selected: String,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
}

/// GET /quotes - List quotes in a category.
async fn list_quotes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Record>>> {
    let records = with_store(&state.store, move |store| {
        let category = query.category.unwrap_or_else(|| store.active_category());
        store
            .query()
            .category(&category)
            .all()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(Json(records))
}

/// POST /quotes - Add a quote authored locally.
async fn add_quote(
    State(state): State<AppState>,
    Json(request): Json<NewQuote>,
) -> Result<(StatusCode, Json<Record>)> {
    let NewQuote { text, category } = request;
    let record = with_store(&state.store, move |store| {
        store.add_local(&text, &category, Utc::now())
    })
    .await??;

    tracing::info!(id = %record.id, category = %record.category, "Quote added locally");
    state.conn_manager.notify(LOCAL_ADD_NOTICE);

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /quotes/random - Pick one quote.
async fn random_quote(State(state): State<AppState>) -> Result<Json<Record>> {
    let store = state.store.lock().await;
    let picked = store.random(&mut rand::thread_rng()).cloned();
    picked
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no quotes available".to_string()))
}

/// GET /categories - Distinct categories and the persisted filter.
async fn list_categories(State(state): State<AppState>) -> Result<Json<CategoriesResponse>> {
    let response = with_store(&state.store, |store| CategoriesResponse {
        categories: store.categories(),
        selected: store.active_category(),
    })
    .await?;
    Ok(Json(response))
}

/// PUT /filter - Persist the selected category.
async fn set_filter(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<StatusCode> {
    let category = request.category.trim().to_string();
    if category.is_empty() {
        return Err(AppError::BadRequest("category must not be empty".to_string()));
    }

    let persisted = with_store(&state.store, move |store| {
        store.set_selected_category(&category)
    })
    .await?;
    if let Err(e) = persisted {
        tracing::warn!("Selected category not persisted: {}", e);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /export - Download the collection.
async fn export_quotes(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let json = state.store.lock().await.export_json()?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"quotes.json\""),
        ],
        json,
    ))
}

/// POST /import - Append every quote in the request body.
async fn import_quotes(State(state): State<AppState>, body: String) -> Result<Json<ImportResponse>> {
    let result = with_store(&state.store, move |store| {
        store.import_json(&body, Utc::now())
    })
    .await?;

    match result {
        Ok(imported) => {
            tracing::info!(imported, "Imported quotes");
            state.conn_manager.notify(IMPORT_OK_NOTICE);
            Ok(Json(ImportResponse { imported }))
        }
        Err(e) => {
            state.conn_manager.notify(IMPORT_FAILED_NOTICE);
            Err(e.into())
        }
    }
}
