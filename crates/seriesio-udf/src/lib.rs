//! SeriesIO UDF - user-defined function registration
//!
//! Registrations live in memory and, unless marked temporary, survive
//! restarts through a plain-text log. See [`registration`] for the log
//! handover protocol.

pub mod registration;

pub use registration::{UdfRegistration, UdfRegistrationService};
