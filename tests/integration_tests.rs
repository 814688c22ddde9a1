use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tower::ServiceExt;

use bookline::config::AppConfig;
use bookline::db::{self, queries};
use bookline::handlers;
use bookline::models::{BusinessHours, BusyInterval, Tenant};
use bookline::services::calendar::{
    CalendarCredentials, CalendarProvider, CreatedEvent, FreeBusyResult, RefreshedToken,
};
use bookline::services::messaging::MessagingProvider;
use bookline::state::AppState;

// ── Mock Providers ──

/// External calendar that always fails — a timed-out or quota-limited
/// provider from the core's point of view.
struct FailingCalendar;

#[async_trait]
impl CalendarProvider for FailingCalendar {
    async fn free_busy(
        &self,
        _creds: &CalendarCredentials,
        _tz: Tz,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> anyhow::Result<FreeBusyResult> {
        anyhow::bail!("upstream timeout")
    }

    async fn create_event(
        &self,
        _creds: &CalendarCredentials,
        _tz: Tz,
        _summary: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<CreatedEvent> {
        anyhow::bail!("upstream timeout")
    }

    async fn delete_event(
        &self,
        _creds: &CalendarCredentials,
        _event_id: &str,
    ) -> anyhow::Result<Option<RefreshedToken>> {
        anyhow::bail!("upstream timeout")
    }
}

/// External calendar with a fixed busy list and a recorded deletion log.
struct StubCalendar {
    busy: Vec<BusyInterval>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl StubCalendar {
    fn empty() -> Self {
        Self {
            busy: vec![],
            deleted: Arc::new(Mutex::new(vec![])),
        }
    }
}

#[async_trait]
impl CalendarProvider for StubCalendar {
    async fn free_busy(
        &self,
        _creds: &CalendarCredentials,
        _tz: Tz,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> anyhow::Result<FreeBusyResult> {
        Ok(FreeBusyResult {
            intervals: self.busy.clone(),
            refreshed: None,
        })
    }

    async fn create_event(
        &self,
        _creds: &CalendarCredentials,
        _tz: Tz,
        _summary: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<CreatedEvent> {
        Ok(CreatedEvent {
            event_id: "evt-123".to_string(),
            refreshed: None,
        })
    }

    async fn delete_event(
        &self,
        _creds: &CalendarCredentials,
        event_id: &str,
    ) -> anyhow::Result<Option<RefreshedToken>> {
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(None)
    }
}

struct MockMessaging {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        base_url: "http://test.local".to_string(),
        google_client_id: "".to_string(),
        google_client_secret: "".to_string(),
        calendar_timeout_secs: 1,
        messaging_gateway_url: "".to_string(),
        messaging_gateway_key: "".to_string(),
    }
}

fn test_tenant() -> Tenant {
    Tenant {
        id: "t1".to_string(),
        name: "Acme Realty".to_string(),
        agent_phone: "+15550001111".to_string(),
        agent_locale: "en".to_string(),
        timezone: "UTC".to_string(),
        business_hours: BusinessHours {
            start_hour: 9,
            end_hour: 18,
            slot_duration_minutes: 60,
        },
        rest_day: "sun".to_string(),
        calendar_connected: false,
        calendar_id: None,
        access_token: None,
        refresh_token: None,
        token_expires_at: None,
    }
}

fn connected_tenant() -> Tenant {
    let mut tenant = test_tenant();
    tenant.calendar_connected = true;
    tenant.calendar_id = Some("primary".to_string());
    tenant.access_token = Some("at".to_string());
    tenant.refresh_token = Some("rt".to_string());
    tenant
}

fn test_state_with(
    tenant: &Tenant,
    calendar: Box<dyn CalendarProvider>,
) -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    let conn = db::init_db(":memory:").unwrap();
    queries::save_tenant(&conn, tenant).unwrap();

    let sent = Arc::new(Mutex::new(vec![]));
    let messaging = MockMessaging {
        sent: Arc::clone(&sent),
    };
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        calendar,
        messaging: Box::new(messaging),
    });
    (state, sent)
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    test_state_with(&test_tenant(), Box::new(StubCalendar::empty()))
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/availability", get(handlers::availability::get_availability))
        .route("/appointments", post(handlers::appointments::create_appointment))
        .route(
            "/cancel",
            get(handlers::cancel::lookup_cancellation).post(handlers::cancel::cancel_appointment),
        )
        .with_state(state)
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A future weekday that is not the tenant's rest day.
fn future_workday() -> chrono::NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(2);
    if date.weekday() == chrono::Weekday::Sun {
        date += Duration::days(1);
    }
    date
}

fn booking_request(date: &str, time: &str) -> Request<Body> {
    let body = serde_json::json!({
        "tenantId": "t1",
        "contactName": "Alice Example",
        "contactPhone": "+15551110000",
        "date": date,
        "time": time,
        "type": "viewing",
    });
    Request::builder()
        .method("POST")
        .uri("/appointments")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn availability_request(days: u32) -> Request<Body> {
    Request::builder()
        .uri(format!("/availability?tenant=t1&days={days}&locale=en"))
        .body(Body::empty())
        .unwrap()
}

/// Pull the cancellation token out of the confirmation message, the same
/// way a customer would follow the link.
fn token_from_confirmation(sent: &Arc<Mutex<Vec<(String, String)>>>) -> String {
    let messages = sent.lock().unwrap();
    let (_, body) = messages
        .iter()
        .find(|(to, _)| to == "+15551110000")
        .expect("no confirmation sent");
    let idx = body.find("token=").expect("no cancel link in confirmation");
    body[idx + "token=".len()..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Availability ──

#[tokio::test]
async fn test_availability_slots_future_and_shaped() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app.oneshot(availability_request(3)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["source"], "default");
    let slots = json["slots"].as_array().unwrap();
    assert!(!slots.is_empty());

    let today = Utc::now().date_naive();
    for slot in slots {
        let date: chrono::NaiveDate = slot["isoDate"].as_str().unwrap().parse().unwrap();
        assert!(date > today, "offered slot must be in the future");
        assert_ne!(date.weekday(), chrono::Weekday::Sun, "rest day must be skipped");
        assert!(slot["label"].is_string());
        assert!(slot["type"].is_string());
        assert!(slot["available"].is_boolean());
    }
}

#[tokio::test]
async fn test_availability_nine_slots_per_day() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app.oneshot(availability_request(3)).await.unwrap();
    let json = body_json(res).await;
    let slots = json["slots"].as_array().unwrap();

    let mut per_day = std::collections::HashMap::new();
    for slot in slots {
        *per_day
            .entry(slot["isoDate"].as_str().unwrap().to_string())
            .or_insert(0usize) += 1;
    }
    for (_, count) in per_day {
        assert_eq!(count, 9, "9..18 with 60-minute slots is 9 per day");
    }
}

#[tokio::test]
async fn test_availability_unknown_tenant() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/availability?tenant=nope&days=3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_availability_spanish_labels() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/availability?tenant=t1&days=1&locale=es")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(res).await;
    if let Some(slot) = json["slots"].as_array().unwrap().first() {
        assert_eq!(slot["label"], "Mañana");
    }
}

#[tokio::test]
async fn test_availability_degrades_when_provider_fails() {
    let (state, _) = test_state_with(&connected_tenant(), Box::new(FailingCalendar));
    let app = test_app(state);

    let res = app.oneshot(availability_request(3)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = body_json(res).await;
    assert_eq!(json["source"], "default");
    assert!(!json["slots"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_availability_uses_external_source_when_connected() {
    let (state, _) = test_state_with(&connected_tenant(), Box::new(StubCalendar::empty()));
    let app = test_app(state);

    let res = app.oneshot(availability_request(3)).await.unwrap();
    let json = body_json(res).await;
    assert_eq!(json["source"], "external");
}

// ── Booking ──

#[tokio::test]
async fn test_booking_created() {
    let (state, sent) = test_state();
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let res = app.oneshot(booking_request(&date, "14:00")).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let json = body_json(res).await;
    assert_eq!(json["appointment"]["status"], "scheduled");
    assert_eq!(json["appointment"]["time"], "14:00");
    assert_eq!(json["appointment"]["type"], "viewing");

    // Confirmation went to the visitor and carries the cancel link
    let token = token_from_confirmation(&sent);
    assert_eq!(token.len(), 32);
}

#[tokio::test]
async fn test_booking_conflict_on_taken_slot() {
    let (state, _) = test_state();
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let first = app
        .clone()
        .oneshot(booking_request(&date, "10:00"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(booking_request(&date, "10:00")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_booking_race_one_winner() {
    let (state, _) = test_state();
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let (a, b) = tokio::join!(
        app.clone().oneshot(booking_request(&date, "11:00")),
        app.clone().oneshot(booking_request(&date, "11:00")),
    );
    let statuses = [a.unwrap().status(), b.unwrap().status()];

    assert!(statuses.contains(&StatusCode::CREATED));
    assert!(statuses.contains(&StatusCode::CONFLICT));
}

#[tokio::test]
async fn test_booked_slot_disappears_from_availability() {
    let (state, _) = test_state();
    let app = test_app(state);

    let date = future_workday();
    let iso = date.format("%Y-%m-%d").to_string();
    let res = app
        .clone()
        .oneshot(booking_request(&iso, "14:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app.oneshot(availability_request(7)).await.unwrap();
    let json = body_json(res).await;
    let slot = json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["isoDate"] == iso.as_str() && s["time"] == "14:00")
        .expect("booked slot still listed");
    assert_eq!(slot["available"], false);
}

#[tokio::test]
async fn test_booking_unknown_tenant() {
    let (state, _) = test_state();
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let body = serde_json::json!({
        "tenantId": "nope",
        "contactName": "Alice",
        "contactPhone": "+15551110000",
        "date": date,
        "time": "10:00",
        "type": "viewing",
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/appointments")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_validation_errors() {
    let (state, _) = test_state();
    let app = test_app(state);

    // Bad date format
    let res = app
        .clone()
        .oneshot(booking_request("16-06-2025", "10:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Outside business hours
    let date = future_workday().format("%Y-%m-%d").to_string();
    let res = app
        .clone()
        .oneshot(booking_request(&date, "07:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Rest day
    let mut sunday = Utc::now().date_naive() + Duration::days(2);
    while sunday.weekday() != chrono::Weekday::Sun {
        sunday += Duration::days(1);
    }
    let res = app
        .clone()
        .oneshot(booking_request(&sunday.format("%Y-%m-%d").to_string(), "10:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Empty contact name
    let body = serde_json::json!({
        "tenantId": "t1",
        "contactName": "",
        "contactPhone": "+15551110000",
        "date": date,
        "time": "10:00",
        "type": "viewing",
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/appointments")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_repeat_booker_reuses_contact_and_alerts_agent() {
    let (state, sent) = test_state();
    let db = Arc::clone(&state.db);
    let app = test_app(state);

    let date = future_workday();
    let first = date.format("%Y-%m-%d").to_string();
    let second = (date + Duration::days(7)).format("%Y-%m-%d").to_string();

    // Second visit within the 7-day window reuses the contact; two live
    // bookings push the lead score over the hot threshold.
    app.clone().oneshot(booking_request(&first, "10:00")).await.unwrap();
    app.clone().oneshot(booking_request(&second, "10:00")).await.unwrap();

    {
        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    let messages = sent.lock().unwrap();
    assert!(
        messages
            .iter()
            .any(|(to, body)| to == "+15550001111" && body.contains("Hot lead")),
        "agent should receive a hot-lead alert"
    );
}

#[tokio::test]
async fn test_reused_contact_keeps_late_email() {
    let (state, _) = test_state();
    let db = Arc::clone(&state.db);
    let app = test_app(state);

    let date = future_workday();
    let first = date.format("%Y-%m-%d").to_string();
    let second = (date + Duration::days(7)).format("%Y-%m-%d").to_string();

    // First visit without an email
    let res = app
        .clone()
        .oneshot(booking_request(&first, "10:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Second visit supplies one; it must stick to the reused contact
    let body = serde_json::json!({
        "tenantId": "t1",
        "contactName": "Alice Example",
        "contactPhone": "+15551110000",
        "contactEmail": "alice@example.com",
        "date": second,
        "time": "10:00",
        "type": "viewing",
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/appointments")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let conn = db.lock().unwrap();
    let (email, score): (Option<String>, i64) = conn
        .query_row(
            "SELECT email, lead_score FROM contacts WHERE phone = '+15551110000'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(email.as_deref(), Some("alice@example.com"));
    // Two live bookings plus the email bonus
    assert_eq!(score, 75);
}

// ── Cancellation ──

#[tokio::test]
async fn test_cancel_flow_and_idempotence() {
    let (state, sent) = test_state();
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let res = app
        .clone()
        .oneshot(booking_request(&date, "15:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let token = token_from_confirmation(&sent);

    // Lookup renders the confirmation screen
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/cancel?token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["appointment"]["time"], "15:00");

    // First cancel succeeds
    let cancel_body = serde_json::json!({ "token": token }).to_string();
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel")
                .header("content-type", "application/json")
                .body(Body::from(cancel_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["appointment"]["status"], "cancelled");

    // Replay fails: the token was cleared on first use
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel")
                .header("content-type", "application/json")
                .body(Body::from(cancel_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Agent got notified about the cancellation
    let messages = sent.lock().unwrap();
    assert!(messages
        .iter()
        .any(|(to, body)| to == "+15550001111" && body.contains("cancelled")));
}

#[tokio::test]
async fn test_cancel_unknown_token() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cancel?token=not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"token":"not-a-real-token"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancelled_slot_reopens() {
    let (state, sent) = test_state();
    let app = test_app(state);

    let date = future_workday();
    let iso = date.format("%Y-%m-%d").to_string();
    app.clone().oneshot(booking_request(&iso, "16:00")).await.unwrap();
    let token = token_from_confirmation(&sent);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.oneshot(availability_request(7)).await.unwrap();
    let json = body_json(res).await;
    let slot = json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["isoDate"] == iso.as_str() && s["time"] == "16:00")
        .unwrap();
    assert_eq!(slot["available"], true);
}

#[tokio::test]
async fn test_cancel_deletes_mirrored_event() {
    let stub = StubCalendar::empty();
    let deleted = Arc::clone(&stub.deleted);
    let (state, sent) = test_state_with(&connected_tenant(), Box::new(stub));
    let app = test_app(state);

    let date = future_workday().format("%Y-%m-%d").to_string();
    let res = app
        .clone()
        .oneshot(booking_request(&date, "12:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let token = token_from_confirmation(&sent);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cancel")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(deleted.lock().unwrap().as_slice(), ["evt-123"]);
}
