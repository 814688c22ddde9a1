use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use rusqlite::Connection;

use crate::models::{Slot, Tenant};
use crate::services::busy;
use crate::services::calendar::CalendarProvider;
use crate::services::slots;

pub struct AvailabilityResult {
    pub slots: Vec<Slot>,
    /// "external" when provider busy data was used, "default" otherwise.
    pub source: &'static str,
}

/// Offered slots for the next `days` days. Read-only: the race between
/// this read and a later booking write is settled by the booking insert.
pub async fn get_availability(
    calendar: &dyn CalendarProvider,
    db: &Arc<Mutex<Connection>>,
    tenant: &Tenant,
    days: u32,
    locale: &str,
) -> anyhow::Result<AvailabilityResult> {
    let tz = tenant.tz();
    let now_local = Utc::now().with_timezone(&tz).naive_local();
    let today = now_local.date();

    let mut candidates = slots::generate_slots(
        today,
        days,
        &tenant.business_hours,
        tenant.rest_weekday(),
        locale,
    );

    let window_from = today + Duration::days(1);
    let window_to = today + Duration::days(days as i64);
    let (exclusions, source) =
        busy::resolve_with_fallback(calendar, db, tenant, window_from, window_to).await?;

    let duration = tenant.business_hours.slot_duration_minutes;
    for slot in &mut candidates {
        let start = slot.start();
        let end = slot.end(duration);
        slot.available = start > now_local && !exclusions.is_busy(slot.date, &slot.time, start, end);
    }

    tracing::debug!(
        tenant = %tenant.id,
        days,
        source,
        offered = candidates.iter().filter(|s| s.available).count(),
        "computed availability"
    );

    Ok(AvailabilityResult {
        slots: candidates,
        source,
    })
}
