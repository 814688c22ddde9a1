use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::availability;
use crate::state::AppState;

const DEFAULT_DAYS: u32 = 7;
const MAX_DAYS: u32 = 30;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub tenant: String,
    pub days: Option<u32>,
    pub locale: Option<String>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let locale = query.locale.as_deref().unwrap_or("en");

    let tenant = {
        let db = state.db.lock().unwrap();
        queries::get_tenant(&db, &query.tenant)?
            .ok_or_else(|| AppError::NotFound("unknown tenant".to_string()))?
    };

    let result = availability::get_availability(
        state.calendar.as_ref(),
        &state.db,
        &tenant,
        days,
        locale,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "slots": result.slots,
        "source": result.source,
    })))
}
