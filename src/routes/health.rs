use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let vendors: Vec<&str> = state
        .vendors
        .configured()
        .into_iter()
        .map(|vendor| vendor.as_str())
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "vendors": vendors,
            "documentClassification": state.oracle.is_some(),
        })),
    )
}
