use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::{
    CalendarCredentials, CalendarProvider, CreatedEvent, FreeBusyResult, RefreshedToken,
};
use crate::models::BusyInterval;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendarClient {
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(client_id: String, client_secret: String, timeout_secs: u64) -> Self {
        Self {
            client_id,
            client_secret,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Returns a usable access token, refreshing through the OAuth
    /// refresh-token grant when the stored one is about to expire.
    async fn ensure_token(
        &self,
        creds: &CalendarCredentials,
    ) -> anyhow::Result<(String, Option<RefreshedToken>)> {
        if !creds.needs_refresh(Utc::now().naive_utc()) {
            return Ok((creds.access_token.clone(), None));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("token refresh request failed")?
            .error_for_status()
            .context("token refresh rejected")?
            .json()
            .await
            .context("malformed token response")?;

        let refreshed = RefreshedToken {
            access_token: response.access_token.clone(),
            expires_at: Utc::now().naive_utc() + chrono::Duration::seconds(response.expires_in),
        };
        Ok((response.access_token, Some(refreshed)))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn free_busy(
        &self,
        creds: &CalendarCredentials,
        tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<FreeBusyResult> {
        let (token, refreshed) = self.ensure_token(creds).await?;

        #[derive(Deserialize)]
        struct FreeBusyResponse {
            calendars: std::collections::HashMap<String, CalendarBusy>,
        }
        #[derive(Deserialize)]
        struct CalendarBusy {
            #[serde(default)]
            busy: Vec<BusyWindow>,
        }
        #[derive(Deserialize)]
        struct BusyWindow {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        }

        let body = serde_json::json!({
            "timeMin": time_min.to_rfc3339(),
            "timeMax": time_max.to_rfc3339(),
            "timeZone": tz.name(),
            "items": [{ "id": creds.calendar_id }],
        });

        let response: FreeBusyResponse = self
            .client
            .post(format!("{API_BASE}/freeBusy"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("freeBusy request failed")?
            .error_for_status()
            .context("freeBusy rejected")?
            .json()
            .await
            .context("malformed freeBusy response")?;

        let intervals = response
            .calendars
            .get(&creds.calendar_id)
            .map(|c| {
                c.busy
                    .iter()
                    .map(|w| BusyInterval {
                        start: w.start.with_timezone(&tz).naive_local(),
                        end: w.end.with_timezone(&tz).naive_local(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(FreeBusyResult { intervals, refreshed })
    }

    async fn create_event(
        &self,
        creds: &CalendarCredentials,
        tz: Tz,
        summary: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<CreatedEvent> {
        let (token, refreshed) = self.ensure_token(creds).await?;

        #[derive(Deserialize)]
        struct EventResponse {
            id: String,
        }

        let start_utc = tz
            .from_local_datetime(&start)
            .earliest()
            .context("slot start not representable in tenant timezone")?;
        let end_utc = tz
            .from_local_datetime(&end)
            .earliest()
            .context("slot end not representable in tenant timezone")?;

        let body = serde_json::json!({
            "summary": summary,
            "start": { "dateTime": start_utc.to_rfc3339(), "timeZone": tz.name() },
            "end": { "dateTime": end_utc.to_rfc3339(), "timeZone": tz.name() },
        });

        let response: EventResponse = self
            .client
            .post(format!(
                "{API_BASE}/calendars/{}/events",
                creds.calendar_id
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("event creation request failed")?
            .error_for_status()
            .context("event creation rejected")?
            .json()
            .await
            .context("malformed event response")?;

        Ok(CreatedEvent {
            event_id: response.id,
            refreshed,
        })
    }

    async fn delete_event(
        &self,
        creds: &CalendarCredentials,
        event_id: &str,
    ) -> anyhow::Result<Option<RefreshedToken>> {
        let (token, refreshed) = self.ensure_token(creds).await?;

        self.client
            .delete(format!(
                "{API_BASE}/calendars/{}/events/{}",
                creds.calendar_id, event_id
            ))
            .bearer_auth(&token)
            .send()
            .await
            .context("event deletion request failed")?
            .error_for_status()
            .context("event deletion rejected")?;

        Ok(refreshed)
    }
}
