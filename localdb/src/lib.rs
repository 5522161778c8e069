//! localdb
//!
//! Embedded SQLite database service for kiosk-server.
//!
//! Provides a single-owner start/stop lifecycle around a file-backed SQLite
//! database plus a cloneable [`DatabaseHandle`] for running queries. The
//! service is designed to be driven by server lifecycle events: opened on
//! before-start, closed on after-stop.

pub mod error;
pub mod service;

pub use error::{DbError, DbResult};
pub use service::{DatabaseHandle, DatabaseService};
