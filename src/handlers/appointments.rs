use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::booking::{self, BookingRequest};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentBody {
    pub tenant_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub appt_type: String,
    pub notes: Option<String>,
    pub locale: Option<String>,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAppointmentBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let date = NaiveDate::parse_from_str(&body.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be YYYY-MM-DD".to_string()))?;

    let tenant = {
        let db = state.db.lock().unwrap();
        queries::get_tenant(&db, &body.tenant_id)?
            .ok_or_else(|| AppError::NotFound("unknown tenant".to_string()))?
    };

    let request = BookingRequest {
        contact_name: body.contact_name,
        contact_phone: body.contact_phone,
        contact_email: body.contact_email,
        date,
        time: body.time,
        appt_type: body.appt_type,
        notes: body.notes,
        locale: body.locale.unwrap_or_else(|| "en".to_string()),
    };

    let appointment = booking::book(&state, &tenant, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "appointment": {
                "id": appointment.id,
                "date": appointment.date.format("%Y-%m-%d").to_string(),
                "time": appointment.time,
                "type": appointment.appt_type,
                "status": appointment.status,
            }
        })),
    ))
}
