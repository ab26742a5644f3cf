pub mod delivery_worker;
pub mod domain;
pub mod http;

pub use delivery_worker::*;
pub use domain::*;
pub use http::*;

#[cfg(any(test, feature = "testing"))]
pub use domain::MockWebhookClient;
