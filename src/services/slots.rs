use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::models::{BusinessHours, Slot};

/// Generate candidate slots for [today+1, today+days], skipping the rest
/// day. Pure and clock-free: `today` is injected by the caller.
pub fn generate_slots(
    today: NaiveDate,
    days: u32,
    hours: &BusinessHours,
    rest_day: Weekday,
    locale: &str,
) -> Vec<Slot> {
    let mut slots = Vec::new();
    let step = hours.slot_duration_minutes.max(1);

    for offset in 1..=days as i64 {
        let date = today + Duration::days(offset);
        if date.weekday() == rest_day {
            continue;
        }

        let mut minute = hours.start_hour * 60;
        let end_minute = hours.end_hour * 60;
        while minute < end_minute {
            let hour = minute / 60;
            let (period, label) = period_label(hour, locale);
            slots.push(Slot {
                display_date: date.format("%a %d %b").to_string(),
                date,
                time: format!("{:02}:{:02}", hour, minute % 60),
                label: label.to_string(),
                period: period.to_string(),
                available: true,
            });
            minute += step;
        }
    }

    slots
}

/// Period of day for an hour, with the display label in the requested
/// locale. Unknown locales fall back to English.
pub fn period_label(hour: u32, locale: &str) -> (&'static str, &'static str) {
    let period = if hour < 12 {
        "morning"
    } else if hour < 18 {
        "afternoon"
    } else {
        "evening"
    };

    let lang = locale.split(['-', '_']).next().unwrap_or("en");
    let label = match (lang, period) {
        ("es", "morning") => "Mañana",
        ("es", "afternoon") => "Tarde",
        ("es", "evening") => "Noche",
        ("pt", "morning") => "Manhã",
        ("pt", "afternoon") => "Tarde",
        ("pt", "evening") => "Noite",
        (_, "morning") => "Morning",
        (_, "afternoon") => "Afternoon",
        _ => "Evening",
    };

    (period, label)
}
