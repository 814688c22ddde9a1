pub mod appointments;
pub mod availability;
pub mod cancel;
pub mod health;
