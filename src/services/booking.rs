use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus, Contact, Tenant};
use crate::services::calendar::CalendarCredentials;
use crate::services::notifications;
use crate::state::AppState;

/// Repeat visitors within this window reuse their contact record instead
/// of creating a duplicate.
pub const CONTACT_REUSE_DAYS: i64 = 7;

const LEAD_SCORE_PER_BOOKING: i64 = 30;
const LEAD_SCORE_EMAIL_BONUS: i64 = 15;
pub const HOT_LEAD_THRESHOLD: i64 = 60;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub appt_type: String,
    pub notes: Option<String>,
    pub locale: String,
}

/// Commit a booking exactly once. The slot re-check happens inside the
/// insert: the partial unique index decides races, the loser gets Conflict.
pub async fn book(
    state: &AppState,
    tenant: &Tenant,
    req: BookingRequest,
) -> Result<Appointment, AppError> {
    validate_request(tenant, &req)?;

    let now = Utc::now().naive_utc();
    let token = generate_cancellation_token();

    let (appointment, contact, previous_score) = {
        let db = state.db.lock().unwrap();

        // Re-verify before touching contacts; the unique index on the
        // insert below still decides true races.
        if queries::slot_taken(&db, &tenant.id, &req.date, &req.time)? {
            return Err(AppError::Conflict("slot is no longer available".to_string()));
        }

        let cutoff = now - Duration::days(CONTACT_REUSE_DAYS);
        let contact = match queries::find_recent_contact(
            &db,
            &tenant.id,
            &req.contact_phone,
            &cutoff,
        )? {
            Some(mut existing) => {
                // A returning visitor may hand over their email this time;
                // keep it so the record and its score bonus survive
                if existing.email.is_none() {
                    if let Some(email) = &req.contact_email {
                        queries::update_contact_email(&db, &existing.id, email)?;
                        existing.email = Some(email.clone());
                    }
                }
                existing
            }
            None => {
                let contact = Contact {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant.id.clone(),
                    name: req.contact_name.clone(),
                    phone: req.contact_phone.clone(),
                    email: req.contact_email.clone(),
                    lead_score: 0,
                    created_at: now,
                };
                queries::create_contact(&db, &contact)?;
                contact
            }
        };

        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.id.clone(),
            contact_id: contact.id.clone(),
            contact_name: req.contact_name.clone(),
            contact_phone: req.contact_phone.clone(),
            contact_email: req.contact_email.clone(),
            date: req.date,
            time: req.time.clone(),
            appt_type: req.appt_type.clone(),
            notes: req.notes.clone(),
            status: AppointmentStatus::Scheduled,
            cancellation_token: Some(token.clone()),
            external_event_id: None,
            locale: req.locale.clone(),
            created_at: now,
            updated_at: now,
        };

        if !queries::insert_appointment(&db, &appointment)? {
            tracing::info!(
                tenant = %tenant.id,
                date = %req.date,
                time = %req.time,
                "slot already taken"
            );
            return Err(AppError::Conflict("slot is no longer available".to_string()));
        }

        let previous_score = contact.lead_score;
        let bookings = queries::count_live_appointments_for_contact(&db, &contact.id)?;
        let score = LEAD_SCORE_PER_BOOKING * bookings
            + if contact.email.is_some() {
                LEAD_SCORE_EMAIL_BONUS
            } else {
                0
            };
        queries::update_lead_score(&db, &contact.id, score)?;

        (appointment, Contact { lead_score: score, ..contact }, previous_score)
    };

    tracing::info!(
        tenant = %tenant.id,
        appointment = %appointment.id,
        date = %appointment.date,
        time = %appointment.time,
        "booking created"
    );

    let appointment = mirror_external_event(state, tenant, appointment).await;

    let cancel_url = format!("{}/cancel?token={}", state.config.base_url, token);
    let display_date = appointment.date.format("%a %d %b").to_string();
    let body = notifications::confirmation(
        &req.locale,
        &tenant.name,
        &display_date,
        &appointment.time,
        &cancel_url,
    );
    notifications::send_best_effort(
        state.messaging.as_ref(),
        &tenant.id,
        &appointment.contact_phone,
        &body,
    )
    .await;

    if previous_score < HOT_LEAD_THRESHOLD && contact.lead_score >= HOT_LEAD_THRESHOLD {
        let alert = notifications::hot_lead_alert(
            &tenant.agent_locale,
            &contact.name,
            &contact.phone,
            contact.lead_score,
        );
        notifications::send_best_effort(
            state.messaging.as_ref(),
            &tenant.id,
            &tenant.agent_phone,
            &alert,
        )
        .await;
    }

    Ok(appointment)
}

/// Best-effort mirror of the booking onto the connected external calendar.
/// Failure is logged and never fails the booking.
async fn mirror_external_event(
    state: &AppState,
    tenant: &Tenant,
    mut appointment: Appointment,
) -> Appointment {
    let Some(creds) = CalendarCredentials::from_tenant(tenant) else {
        return appointment;
    };

    let start = appointment.start();
    let end = start + Duration::minutes(tenant.business_hours.slot_duration_minutes as i64);
    let summary = format!("{} — {}", appointment.appt_type, appointment.contact_name);

    match state
        .calendar
        .create_event(&creds, tenant.tz(), &summary, start, end)
        .await
    {
        Ok(created) => {
            let db = state.db.lock().unwrap();
            if let Err(e) = queries::set_external_event_id(&db, &appointment.id, &created.event_id)
            {
                tracing::error!(tenant = %tenant.id, error = %e, "failed to store external event id");
            } else {
                appointment.external_event_id = Some(created.event_id);
            }
            if let Some(refreshed) = created.refreshed {
                let _ = queries::update_tenant_token(
                    &db,
                    &tenant.id,
                    &refreshed.access_token,
                    &refreshed.expires_at,
                );
            }
        }
        Err(e) => {
            tracing::warn!(tenant = %tenant.id, error = %e, "external event creation failed");
        }
    }

    appointment
}

fn validate_request(tenant: &Tenant, req: &BookingRequest) -> Result<(), AppError> {
    if req.contact_name.trim().is_empty() {
        return Err(AppError::Validation("contact name is required".to_string()));
    }
    if req.contact_phone.trim().is_empty() {
        return Err(AppError::Validation("contact phone is required".to_string()));
    }

    let time = NaiveTime::parse_from_str(&req.time, "%H:%M")
        .map_err(|_| AppError::Validation("time must be HH:MM".to_string()))?;

    let hours = &tenant.business_hours;
    let minute = time.format("%H:%M").to_string();
    let minutes_from_midnight: u32 = {
        use chrono::Timelike;
        time.hour() * 60 + time.minute()
    };
    let start = hours.start_hour * 60;
    let end = hours.end_hour * 60;
    if minutes_from_midnight < start
        || minutes_from_midnight >= end
        || (minutes_from_midnight - start) % hours.slot_duration_minutes.max(1) != 0
    {
        return Err(AppError::Validation(format!(
            "time {minute} is outside business hours"
        )));
    }

    let today = Utc::now().with_timezone(&tenant.tz()).date_naive();
    if req.date <= today {
        return Err(AppError::Validation("date must be in the future".to_string()));
    }

    // The generator never offers the rest day; a hand-crafted request
    // must not book it either
    if req.date.weekday() == tenant.rest_weekday() {
        return Err(AppError::Validation(format!(
            "{} is not a working day",
            tenant.rest_day
        )));
    }

    Ok(())
}

fn generate_cancellation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
