use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus};
use crate::services::calendar::CalendarCredentials;
use crate::services::notifications;
use crate::state::AppState;

/// First characters of a token, safe to log.
fn token_prefix(token: &str) -> &str {
    &token[..token.len().min(8)]
}

/// Read-only resolution of a cancellation token, for rendering the
/// confirmation screen. The token is the sole authorization.
pub fn lookup(conn: &Connection, token: &str) -> Result<Appointment, AppError> {
    queries::get_appointment_by_token(conn, token)?
        .ok_or_else(|| AppError::NotFound("unknown or used cancellation token".to_string()))
}

/// Cancel the appointment the token points at. The token is cleared on the
/// first success, so replaying it returns NotFound.
pub async fn cancel(state: &AppState, token: &str) -> Result<Appointment, AppError> {
    let (mut appointment, tenant) = {
        let db = state.db.lock().unwrap();
        let appointment = lookup(&db, token)?;

        if !queries::cancel_appointment(&db, &appointment.id)? {
            // Raced another cancel between lookup and update
            return Err(AppError::NotFound(
                "unknown or used cancellation token".to_string(),
            ));
        }

        let tenant = queries::get_tenant(&db, &appointment.tenant_id)?
            .ok_or_else(|| AppError::NotFound("unknown tenant".to_string()))?;
        (appointment, tenant)
    };

    appointment.status = AppointmentStatus::Cancelled;
    appointment.cancellation_token = None;

    tracing::info!(
        tenant = %tenant.id,
        appointment = %appointment.id,
        date = %appointment.date,
        time = %appointment.time,
        token_prefix = %token_prefix(token),
        "appointment cancelled"
    );

    // Best-effort removal of the mirrored external event
    if let (Some(event_id), Some(creds)) = (
        appointment.external_event_id.clone(),
        CalendarCredentials::from_tenant(&tenant),
    ) {
        match state.calendar.delete_event(&creds, &event_id).await {
            Ok(refreshed) => {
                if let Some(refreshed) = refreshed {
                    let db = state.db.lock().unwrap();
                    let _ = queries::update_tenant_token(
                        &db,
                        &tenant.id,
                        &refreshed.access_token,
                        &refreshed.expires_at,
                    );
                }
            }
            Err(e) => {
                tracing::warn!(tenant = %tenant.id, error = %e, "external event deletion failed");
            }
        }
    }

    // Agent notice goes out in the agent's locale, not the customer's
    let display_date = appointment.date.format("%a %d %b").to_string();
    let alert = notifications::cancellation_alert(
        &tenant.agent_locale,
        &appointment.contact_name,
        &display_date,
        &appointment.time,
    );
    notifications::send_best_effort(
        state.messaging.as_ref(),
        &tenant.id,
        &tenant.agent_phone,
        &alert,
    )
    .await;

    Ok(appointment)
}
