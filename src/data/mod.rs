//! Persistence: row models, the [`Store`] seam and its PostgreSQL backend.

pub mod error;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PgStore;
pub use store::Store;
