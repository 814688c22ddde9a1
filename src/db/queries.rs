use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Appointment, AppointmentStatus, BusinessHours, Contact, Tenant};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Tenants ──

pub fn get_tenant(conn: &Connection, id: &str) -> anyhow::Result<Option<Tenant>> {
    let result = conn.query_row(
        "SELECT id, name, agent_phone, agent_locale, timezone, start_hour, end_hour,
                slot_duration_minutes, rest_day, calendar_connected, calendar_id,
                access_token, refresh_token, token_expires_at
         FROM tenants WHERE id = ?1",
        params![id],
        |row| {
            let expires: Option<String> = row.get(13)?;
            Ok(Tenant {
                id: row.get(0)?,
                name: row.get(1)?,
                agent_phone: row.get(2)?,
                agent_locale: row.get(3)?,
                timezone: row.get(4)?,
                business_hours: BusinessHours {
                    start_hour: row.get(5)?,
                    end_hour: row.get(6)?,
                    slot_duration_minutes: row.get(7)?,
                },
                rest_day: row.get(8)?,
                calendar_connected: row.get::<_, i32>(9)? != 0,
                calendar_id: row.get(10)?,
                access_token: row.get(11)?,
                refresh_token: row.get(12)?,
                token_expires_at: expires
                    .and_then(|s| NaiveDateTime::parse_from_str(&s, DT_FMT).ok()),
            })
        },
    );

    match result {
        Ok(tenant) => Ok(Some(tenant)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_tenant(conn: &Connection, tenant: &Tenant) -> anyhow::Result<()> {
    let expires = tenant
        .token_expires_at
        .map(|dt| dt.format(DT_FMT).to_string());
    conn.execute(
        "INSERT INTO tenants (id, name, agent_phone, agent_locale, timezone, start_hour,
                              end_hour, slot_duration_minutes, rest_day, calendar_connected,
                              calendar_id, access_token, refresh_token, token_expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           agent_phone = excluded.agent_phone,
           agent_locale = excluded.agent_locale,
           timezone = excluded.timezone,
           start_hour = excluded.start_hour,
           end_hour = excluded.end_hour,
           slot_duration_minutes = excluded.slot_duration_minutes,
           rest_day = excluded.rest_day,
           calendar_connected = excluded.calendar_connected,
           calendar_id = excluded.calendar_id,
           access_token = excluded.access_token,
           refresh_token = excluded.refresh_token,
           token_expires_at = excluded.token_expires_at,
           updated_at = datetime('now')",
        params![
            tenant.id,
            tenant.name,
            tenant.agent_phone,
            tenant.agent_locale,
            tenant.timezone,
            tenant.business_hours.start_hour,
            tenant.business_hours.end_hour,
            tenant.business_hours.slot_duration_minutes,
            tenant.rest_day,
            tenant.calendar_connected as i32,
            tenant.calendar_id,
            tenant.access_token,
            tenant.refresh_token,
            expires,
        ],
    )?;
    Ok(())
}

/// Persist a refreshed OAuth token. Plain last-writer-wins UPDATE: two
/// concurrent refreshes both store a valid token.
pub fn update_tenant_token(
    conn: &Connection,
    tenant_id: &str,
    access_token: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE tenants SET access_token = ?1, token_expires_at = ?2,
                updated_at = datetime('now')
         WHERE id = ?3",
        params![access_token, expires_at.format(DT_FMT).to_string(), tenant_id],
    )?;
    Ok(())
}

// ── Contacts ──

pub fn create_contact(conn: &Connection, contact: &Contact) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO contacts (id, tenant_id, name, phone, email, lead_score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            contact.id,
            contact.tenant_id,
            contact.name,
            contact.phone,
            contact.email,
            contact.lead_score,
            contact.created_at.format(DT_FMT).to_string(),
        ],
    )?;
    Ok(())
}

/// Most recent contact with this phone created at or after `since`.
pub fn find_recent_contact(
    conn: &Connection,
    tenant_id: &str,
    phone: &str,
    since: &NaiveDateTime,
) -> anyhow::Result<Option<Contact>> {
    let result = conn.query_row(
        "SELECT id, tenant_id, name, phone, email, lead_score, created_at
         FROM contacts
         WHERE tenant_id = ?1 AND phone = ?2 AND created_at >= ?3
         ORDER BY created_at DESC LIMIT 1",
        params![tenant_id, phone, since.format(DT_FMT).to_string()],
        |row| Ok(parse_contact_row(row)),
    );

    match result {
        Ok(contact) => Ok(Some(contact?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_contact_email(conn: &Connection, contact_id: &str, email: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE contacts SET email = ?1 WHERE id = ?2",
        params![email, contact_id],
    )?;
    Ok(())
}

pub fn update_lead_score(conn: &Connection, contact_id: &str, score: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE contacts SET lead_score = ?1 WHERE id = ?2",
        params![score, contact_id],
    )?;
    Ok(())
}

pub fn count_live_appointments_for_contact(
    conn: &Connection,
    contact_id: &str,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE contact_id = ?1 AND status != 'cancelled'",
        params![contact_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_contact_row(row: &rusqlite::Row) -> anyhow::Result<Contact> {
    let created_at_str: String = row.get(6)?;
    Ok(Contact {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        lead_score: row.get(5)?,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, DT_FMT)
            .unwrap_or_else(|_| Utc::now().naive_utc()),
    })
}

// ── Appointments ──

const APPOINTMENT_COLS: &str =
    "id, tenant_id, contact_id, contact_name, contact_phone, contact_email, date, time,
     appt_type, notes, status, cancellation_token, external_event_id, locale,
     created_at, updated_at";

/// Atomic booking write. The partial unique index on
/// (tenant_id, date, time) over non-cancelled rows decides slot races:
/// returns Ok(false) when another appointment already holds the slot.
pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<bool> {
    let result = conn.execute(
        "INSERT INTO appointments (id, tenant_id, contact_id, contact_name, contact_phone,
                                   contact_email, date, time, appt_type, notes, status,
                                   cancellation_token, external_event_id, locale,
                                   created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            appt.id,
            appt.tenant_id,
            appt.contact_id,
            appt.contact_name,
            appt.contact_phone,
            appt.contact_email,
            appt.date.format("%Y-%m-%d").to_string(),
            appt.time,
            appt.appt_type,
            appt.notes,
            appt.status.as_str(),
            appt.cancellation_token,
            appt.external_event_id,
            appt.locale,
            appt.created_at.format(DT_FMT).to_string(),
            appt.updated_at.format(DT_FMT).to_string(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn slot_taken(
    conn: &Connection,
    tenant_id: &str,
    date: &NaiveDate,
    time: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE tenant_id = ?1 AND date = ?2 AND time = ?3 AND status != 'cancelled'",
        params![tenant_id, date.format("%Y-%m-%d").to_string(), time],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_appointments_in_range(
    conn: &Connection,
    tenant_id: &str,
    from: &NaiveDate,
    to: &NaiveDate,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE tenant_id = ?1 AND date >= ?2 AND date <= ?3 AND status != 'cancelled'
         ORDER BY date ASC, time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            tenant_id,
            from.format("%Y-%m-%d").to_string(),
            to.format("%Y-%m-%d").to_string(),
        ],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_appointment_by_token(
    conn: &Connection,
    token: &str,
) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        &format!("SELECT {APPOINTMENT_COLS} FROM appointments WHERE cancellation_token = ?1"),
        params![token],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appt) => Ok(Some(appt?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// First successful cancellation clears the token, so a replayed token no
/// longer resolves. Returns false when the row was already cancelled.
pub fn cancel_appointment(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(DT_FMT).to_string();
    let count = conn.execute(
        "UPDATE appointments
         SET status = 'cancelled', cancellation_token = NULL, updated_at = ?1
         WHERE id = ?2 AND status != 'cancelled'",
        params![now, id],
    )?;
    Ok(count > 0)
}

pub fn set_external_event_id(
    conn: &Connection,
    id: &str,
    event_id: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE appointments SET external_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(())
}

/// Cancelled is terminal: a cancelled row is never updated, so it cannot
/// retake its slot under the unique index. Returns false when no row
/// changed.
pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: &AppointmentStatus,
) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(DT_FMT).to_string();
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status != 'cancelled'",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let date_str: String = row.get(6)?;
    let status_str: String = row.get(10)?;
    let created_at_str: String = row.get(14)?;
    let updated_at_str: String = row.get(15)?;

    Ok(Appointment {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        contact_name: row.get(3)?,
        contact_phone: row.get(4)?,
        contact_email: row.get(5)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| Utc::now().date_naive()),
        time: row.get(7)?,
        appt_type: row.get(8)?,
        notes: row.get(9)?,
        status: AppointmentStatus::parse(&status_str),
        cancellation_token: row.get(11)?,
        external_event_id: row.get(12)?,
        locale: row.get(13)?,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, DT_FMT)
            .unwrap_or_else(|_| Utc::now().naive_utc()),
        updated_at: NaiveDateTime::parse_from_str(&updated_at_str, DT_FMT)
            .unwrap_or_else(|_| Utc::now().naive_utc()),
    })
}
