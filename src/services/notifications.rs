use crate::services::messaging::MessagingProvider;

/// Locale-aware message rendering for every notification the core sends.
/// Unknown locales fall back to English; only the language part of a
/// region code (es-MX) is considered.
fn lang(locale: &str) -> &str {
    match locale.split(['-', '_']).next().unwrap_or("en") {
        l @ ("es" | "pt") => l,
        _ => "en",
    }
}

pub fn confirmation(
    locale: &str,
    tenant_name: &str,
    display_date: &str,
    time: &str,
    cancel_url: &str,
) -> String {
    match lang(locale) {
        "es" => format!(
            "Tu cita con {tenant_name} está confirmada para el {display_date} a las {time}. \
             Si necesitas cancelarla: {cancel_url}"
        ),
        "pt" => format!(
            "Seu agendamento com {tenant_name} está confirmado para {display_date} às {time}. \
             Para cancelar: {cancel_url}"
        ),
        _ => format!(
            "Your appointment with {tenant_name} is confirmed for {display_date} at {time}. \
             Need to cancel? {cancel_url}"
        ),
    }
}

pub fn cancellation_alert(locale: &str, contact_name: &str, display_date: &str, time: &str) -> String {
    match lang(locale) {
        "es" => format!("{contact_name} canceló su cita del {display_date} a las {time}."),
        "pt" => format!("{contact_name} cancelou o agendamento de {display_date} às {time}."),
        _ => format!("{contact_name} cancelled their appointment on {display_date} at {time}."),
    }
}

pub fn hot_lead_alert(locale: &str, contact_name: &str, phone: &str, score: i64) -> String {
    match lang(locale) {
        "es" => format!("Lead caliente: {contact_name} ({phone}), puntuación {score}."),
        "pt" => format!("Lead quente: {contact_name} ({phone}), pontuação {score}."),
        _ => format!("Hot lead: {contact_name} ({phone}), score {score}."),
    }
}

/// Copy for the T-1h reminder. The timer that fires it lives outside this
/// core; the reminder job only needs the rendered body.
pub fn reminder(locale: &str, tenant_name: &str, time: &str) -> String {
    match lang(locale) {
        "es" => format!("Recordatorio: tu cita con {tenant_name} es hoy a las {time}."),
        "pt" => format!("Lembrete: seu agendamento com {tenant_name} é hoje às {time}."),
        _ => format!("Reminder: your appointment with {tenant_name} is today at {time}."),
    }
}

/// Fire-and-forget delivery. A failed or skipped notification never fails
/// the operation that triggered it.
pub async fn send_best_effort(
    messaging: &dyn MessagingProvider,
    tenant_id: &str,
    to: &str,
    body: &str,
) {
    if to.is_empty() {
        tracing::warn!(tenant = %tenant_id, "notification recipient not set, skipping");
        return;
    }
    if let Err(e) = messaging.send_message(to, body).await {
        tracing::error!(tenant = %tenant_id, error = %e, "notification dispatch failed");
    }
}
