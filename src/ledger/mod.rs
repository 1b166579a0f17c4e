// Orders and balances
pub mod luhn;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod repository;

#[cfg(test)]
pub use memory::InMemoryOrderStore;
pub use repository::{OrderStore, PgOrderStore};
