use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub appt_type: String,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub cancellation_token: Option<String>,
    pub external_event_id: Option<String>,
    pub locale: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn start(&self) -> NaiveDateTime {
        let time = NaiveTime::parse_from_str(&self.time, "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        self.date.and_time(time)
    }
}

/// `scheduled → {confirmed, cancelled}`; `cancelled` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => AppointmentStatus::Confirmed,
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Scheduled,
        }
    }

    pub fn can_transition_to(&self, next: &AppointmentStatus) -> bool {
        match self {
            AppointmentStatus::Scheduled => {
                matches!(next, AppointmentStatus::Confirmed | AppointmentStatus::Cancelled)
            }
            AppointmentStatus::Confirmed => matches!(next, AppointmentStatus::Cancelled),
            AppointmentStatus::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in ["scheduled", "confirmed", "cancelled"] {
            assert_eq!(AppointmentStatus::parse(s).as_str(), s);
        }
        assert_eq!(AppointmentStatus::parse("garbage").as_str(), "scheduled");
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let cancelled = AppointmentStatus::Cancelled;
        assert!(!cancelled.can_transition_to(&AppointmentStatus::Scheduled));
        assert!(!cancelled.can_transition_to(&AppointmentStatus::Confirmed));
        assert!(!cancelled.can_transition_to(&AppointmentStatus::Cancelled));
    }

    #[test]
    fn test_scheduled_transitions() {
        let scheduled = AppointmentStatus::Scheduled;
        assert!(scheduled.can_transition_to(&AppointmentStatus::Confirmed));
        assert!(scheduled.can_transition_to(&AppointmentStatus::Cancelled));
    }
}
