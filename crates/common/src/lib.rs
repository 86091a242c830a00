pub mod auth;
pub mod domain;
pub mod garde;
pub mod postgres;
pub mod telemetry;

pub use auth::*;
pub use domain::*;
pub use postgres::*;

// Re-export mocks when the testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use auth::MockAccessEvaluator;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAuditLogRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockContextItemRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockFeatureCatalogRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockFeatureToggleRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockIsolationPolicyRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockOrganizationRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockQuotaRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSharingRequestRepository;
