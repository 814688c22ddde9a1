pub mod appointment;
pub mod contact;
pub mod slot;
pub mod tenant;

pub use appointment::{Appointment, AppointmentStatus};
pub use contact::Contact;
pub use slot::{BusyInterval, Slot};
pub use tenant::{BusinessHours, Tenant};
