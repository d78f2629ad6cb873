//! SQLite persistence for Apptbook's licensing state.
//!
//! [`SqliteStore`] implements [`apptbook_license::ActivationStore`] over the
//! application database: the license record, the device fingerprint and the
//! shared audit log.

mod error;
mod store;

pub use error::{DbError, DbResult};
pub use store::SqliteStore;
