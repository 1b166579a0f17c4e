pub mod client;
pub mod models;

pub use client::{AccrualClient, AccrualSource};
pub use models::AccrualClassification;
