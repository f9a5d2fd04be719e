//! Core of the visit sync engine: reconciles visitor-analytics sessions with
//! the user store on a fixed schedule.

pub mod config;
pub mod errors;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
