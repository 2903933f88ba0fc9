pub mod auth;
pub mod client;
pub mod error;

pub use client::{
    BigQueryClient, QueryParameter, QueryRequest, TableId, WriteDisposition, DEFAULT_BASE_URL,
};
pub use error::WarehouseError;
