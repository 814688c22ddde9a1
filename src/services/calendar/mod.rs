pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::models::{BusyInterval, Tenant};

/// Per-tenant OAuth material for the external calendar. Present only when
/// the settings UI has completed the connect flow.
#[derive(Debug, Clone)]
pub struct CalendarCredentials {
    pub calendar_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<NaiveDateTime>,
}

impl CalendarCredentials {
    pub fn from_tenant(tenant: &Tenant) -> Option<Self> {
        if !tenant.calendar_connected {
            return None;
        }
        Some(Self {
            calendar_id: tenant.calendar_id.clone()?,
            access_token: tenant.access_token.clone()?,
            refresh_token: tenant.refresh_token.clone()?,
            expires_at: tenant.token_expires_at,
        })
    }

    /// Treat a token inside the final minute of its lifetime as expired so
    /// a request never races the provider-side expiry.
    pub fn needs_refresh(&self, now: NaiveDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::seconds(60),
            None => false,
        }
    }
}

/// Token obtained by a transparent refresh; the caller persists it
/// (last-writer-wins, only the token value changes).
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug)]
pub struct FreeBusyResult {
    /// Busy windows in tenant-local time.
    pub intervals: Vec<BusyInterval>,
    pub refreshed: Option<RefreshedToken>,
}

#[derive(Debug)]
pub struct CreatedEvent {
    pub event_id: String,
    pub refreshed: Option<RefreshedToken>,
}

/// External calendar integration. Every call carries the HTTP client's
/// timeout; callers degrade on error rather than surfacing it.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn free_busy(
        &self,
        creds: &CalendarCredentials,
        tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<FreeBusyResult>;

    async fn create_event(
        &self,
        creds: &CalendarCredentials,
        tz: Tz,
        summary: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<CreatedEvent>;

    async fn delete_event(
        &self,
        creds: &CalendarCredentials,
        event_id: &str,
    ) -> anyhow::Result<Option<RefreshedToken>>;
}
