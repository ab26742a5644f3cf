pub mod domain;
pub mod garde;
pub mod geo;
pub mod nid;
pub mod postgres;
pub mod telemetry;

pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeliveryScheduler;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockGroupRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockInboxRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMessageRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockOwnerRepository;
