pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::{AppConfig, Tolerances};
pub use db::{create_pool, DocumentStore, MemoryDocumentStore, PgDocumentStore};
pub use error::{StoreError, VerifyError};
pub use service::{VerificationService, VerifyRequest};
