use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::Appointment;
use crate::services::cancellation;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CancelQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct CancelBody {
    pub token: String,
}

fn summary(appointment: &Appointment) -> serde_json::Value {
    serde_json::json!({
        "appointment": {
            "contactName": appointment.contact_name,
            "date": appointment.date.format("%Y-%m-%d").to_string(),
            "time": appointment.time,
            "type": appointment.appt_type,
            "status": appointment.status,
        }
    })
}

/// Confirmation screen data for an anonymous link recipient.
pub async fn lookup_cancellation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.db.lock().unwrap();
    let appointment = cancellation::lookup(&db, &query.token)?;
    Ok(Json(summary(&appointment)))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CancelBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let appointment = cancellation::cancel(&state, &body.token).await?;
    let mut response = summary(&appointment);
    response["message"] = serde_json::Value::String("appointment cancelled".to_string());
    Ok(Json(response))
}
