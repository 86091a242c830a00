mod audit_repository;
mod client;
mod config;
mod context_item_repository;
mod feature_repository;
mod isolation_repository;
mod organization_repository;
mod quota_repository;
mod sharing_repository;

pub use audit_repository::*;
pub use client::*;
pub use config::*;
pub use context_item_repository::*;
pub use feature_repository::*;
pub use isolation_repository::*;
pub use organization_repository::*;
pub use quota_repository::*;
pub use sharing_repository::*;
