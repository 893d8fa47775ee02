pub mod memory;
pub mod postgres;
pub mod store;

pub use {memory::InMemoryStore, postgres::PgStore, store::DocumentStore};
