mod audit_service;
mod context_service;
mod feature_service;
mod isolation_service;
mod organization_service;
mod quota_service;
mod sharing_service;

pub use audit_service::*;
pub use context_service::*;
pub use feature_service::*;
pub use isolation_service::*;
pub use organization_service::*;
pub use quota_service::*;
pub use sharing_service::*;
