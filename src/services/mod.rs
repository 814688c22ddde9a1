pub mod availability;
pub mod booking;
pub mod busy;
pub mod calendar;
pub mod cancellation;
pub mod messaging;
pub mod notifications;
pub mod slots;
