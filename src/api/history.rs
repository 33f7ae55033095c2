//! Workout and nutrition history CRUD.
//!
//! Every route requires a verified identity token; documents live under the
//! caller's uid and are schemaless JSON objects.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::store::{Collection, Document};

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/workout", post(create_workout))
        .route("/workouts", get(list_workouts))
        .route("/workout/{id}", put(update_workout).delete(delete_workout))
        .route("/nutrition", post(create_nutrition).get(list_nutrition))
        .route("/nutrition/{id}", put(update_nutrition))
}

/// Require a JSON object body.
fn document_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Document, ApiError> {
    match payload {
        Ok(Json(Value::Object(map))) => Ok(map),
        Ok(Json(_)) => Err(ApiError::InvalidBody("expected a JSON object".to_string())),
        Err(rejection) => Err(ApiError::InvalidBody(rejection.body_text())),
    }
}

// ── Shared operations ───────────────────────────────────────────────────

async fn create(
    state: &AppState,
    user: &AuthUser,
    collection: Collection,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let data = document_body(payload)?;
    let id = state.store.insert_record(&user.uid, collection, &data).await?;
    info!(record_id = %id, %collection, "History record created");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn list(
    state: &AppState,
    user: &AuthUser,
    collection: Collection,
) -> Result<Json<Vec<Document>>, ApiError> {
    let records = state.store.list_records(&user.uid, collection).await?;
    Ok(Json(records.into_iter().map(|r| r.data).collect()))
}

async fn update(
    state: &AppState,
    user: &AuthUser,
    collection: Collection,
    id: &str,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let fields = document_body(payload)?;
    state
        .store
        .update_record(&user.uid, collection, id, &fields)
        .await?;
    info!(record_id = %id, %collection, "History record updated");
    Ok(Json(json!({ "success": true })))
}

// ── Workout ─────────────────────────────────────────────────────────────

async fn create_workout(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(&state, &user, Collection::Workout, payload).await
}

async fn list_workouts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Document>>, ApiError> {
    list(&state, &user, Collection::Workout).await
}

async fn update_workout(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    update(&state, &user, Collection::Workout, &id, payload).await
}

async fn delete_workout(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .store
        .delete_record(&user.uid, Collection::Workout, &id)
        .await?;
    info!(record_id = %id, removed, "Workout record delete");
    Ok(Json(json!({ "success": true })))
}

// ── Nutrition ───────────────────────────────────────────────────────────

async fn create_nutrition(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(&state, &user, Collection::Nutrition, payload).await
}

async fn list_nutrition(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Document>>, ApiError> {
    list(&state, &user, Collection::Nutrition).await
}

async fn update_nutrition(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    update(&state, &user, Collection::Nutrition, &id, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_body_is_accepted() {
        let doc = document_body(Ok(Json(json!({"meal": "oats"})))).unwrap();
        assert_eq!(doc["meal"], json!("oats"));
    }

    #[test]
    fn non_object_body_is_rejected() {
        for value in [json!([1, 2]), json!("text"), json!(null), json!(3)] {
            assert!(matches!(
                document_body(Ok(Json(value))),
                Err(ApiError::InvalidBody(_))
            ));
        }
    }
}
