use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Appointment, BusyInterval, Tenant};
use crate::services::calendar::{CalendarCredentials, CalendarProvider};

/// Uniform exclusion set produced by either resolver mode. Local-store
/// appointments also populate an exact (date, time) index so the common
/// case — a candidate matching a stored slot — is a set lookup.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    intervals: Vec<BusyInterval>,
    exact: HashSet<(NaiveDate, String)>,
}

impl ExclusionSet {
    pub fn from_intervals(intervals: Vec<BusyInterval>) -> Self {
        Self {
            intervals,
            exact: HashSet::new(),
        }
    }

    pub fn from_appointments(appointments: &[Appointment], slot_duration_minutes: u32) -> Self {
        let mut exact = HashSet::new();
        let mut intervals = Vec::with_capacity(appointments.len());
        for appt in appointments {
            exact.insert((appt.date, appt.time.clone()));
            let start = appt.start();
            intervals.push(BusyInterval {
                start,
                end: start + Duration::minutes(slot_duration_minutes as i64),
            });
        }
        Self { intervals, exact }
    }

    pub fn is_busy(
        &self,
        date: NaiveDate,
        time: &str,
        slot_start: chrono::NaiveDateTime,
        slot_end: chrono::NaiveDateTime,
    ) -> bool {
        if self.exact.contains(&(date, time.to_string())) {
            return true;
        }
        self.intervals
            .iter()
            .any(|busy| busy.overlaps(slot_start, slot_end))
    }
}

/// Strategy interface over the two busy-data modes; the availability
/// service only sees the exclusion set.
#[async_trait]
pub trait BusyIntervalSource: Send + Sync {
    async fn resolve(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<ExclusionSet>;
}

/// Disconnected mode: busy intervals derived from locally stored
/// non-cancelled appointments.
pub struct LocalStoreSource<'a> {
    pub db: &'a Arc<Mutex<Connection>>,
    pub tenant: &'a Tenant,
}

#[async_trait]
impl BusyIntervalSource for LocalStoreSource<'_> {
    async fn resolve(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<ExclusionSet> {
        let appointments = {
            let db = self.db.lock().unwrap();
            queries::get_appointments_in_range(&db, &self.tenant.id, &from, &to)?
        };
        Ok(ExclusionSet::from_appointments(
            &appointments,
            self.tenant.business_hours.slot_duration_minutes,
        ))
    }
}

/// Connected mode: provider free/busy over the window, with transparent
/// token refresh persisted through the tenant row.
pub struct ExternalProviderSource<'a> {
    pub calendar: &'a dyn CalendarProvider,
    pub db: &'a Arc<Mutex<Connection>>,
    pub tenant: &'a Tenant,
    pub creds: CalendarCredentials,
}

#[async_trait]
impl BusyIntervalSource for ExternalProviderSource<'_> {
    async fn resolve(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<ExclusionSet> {
        let tz = self.tenant.tz();
        let time_min = local_day_start(tz, from)?;
        let time_max = local_day_start(tz, to + Duration::days(1))?;

        let result = self
            .calendar
            .free_busy(&self.creds, tz, time_min, time_max)
            .await?;

        if let Some(refreshed) = &result.refreshed {
            let db = self.db.lock().unwrap();
            queries::update_tenant_token(
                &db,
                &self.tenant.id,
                &refreshed.access_token,
                &refreshed.expires_at,
            )?;
            tracing::debug!(tenant = %self.tenant.id, "persisted refreshed calendar token");
        }

        Ok(ExclusionSet::from_intervals(result.intervals))
    }
}

fn local_day_start(
    tz: chrono_tz::Tz,
    date: NaiveDate,
) -> anyhow::Result<chrono::DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date"))?;
    let local = tz
        .from_local_datetime(&midnight)
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("date not representable in timezone"))?;
    Ok(local.with_timezone(&Utc))
}

/// Resolve busy intervals for the window, falling back to the local store
/// when the tenant is not connected or the provider fails. Returns the
/// exclusion set and the availability source tag.
pub async fn resolve_with_fallback(
    calendar: &dyn CalendarProvider,
    db: &Arc<Mutex<Connection>>,
    tenant: &Tenant,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<(ExclusionSet, &'static str)> {
    if let Some(creds) = CalendarCredentials::from_tenant(tenant) {
        let external = ExternalProviderSource {
            calendar,
            db,
            tenant,
            creds,
        };
        match external.resolve(from, to).await {
            Ok(set) => return Ok((set, "external")),
            Err(e) => {
                tracing::warn!(tenant = %tenant.id, error = %e, "calendar provider unavailable, using local appointments");
            }
        }
    }

    let local = LocalStoreSource { db, tenant };
    Ok((local.resolve(from, to).await?, "default"))
}
