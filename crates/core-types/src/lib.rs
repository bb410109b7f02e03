//! # Hospital Core Types
//!
//! Plain data shared by every other crate in the workspace: the scalar value
//! type used for statement parameters and result cells, the domain records
//! and the small enums that describe them. Nothing in here talks to a
//! database.

pub mod enums;
pub mod error;
pub mod structs;
pub mod value;

// Re-export the core types to provide a clean public API.
pub use enums::{AppointmentStatus, EntityKind, PaymentStatus};
pub use error::CoreError;
pub use structs::{
    Appointment, AppointmentDetails, Doctor, Invoice, InvoiceChanges, InvoiceDetails, MedicalRecord,
    NewAppointment, NewDoctor, NewInvoice, NewMedicalRecord, NewPatient, Patient,
};
pub use value::{normalize_params, Row, RowSet, SqlValue, NULL_PLACEHOLDER};
