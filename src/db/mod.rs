pub mod export;
pub mod memory;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod store;

pub use export::export_to_csv;
pub use memory::MemoryDocumentStore;
pub use pool::create_pool;
pub use queries::PgDocumentStore;
pub use schema::ensure_schema;
pub use store::DocumentStore;
