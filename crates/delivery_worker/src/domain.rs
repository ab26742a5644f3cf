mod delivery_queue;
mod delivery_service;
mod recovery;
mod retry_policy;
mod webhook;

pub use delivery_queue::*;
pub use delivery_service::*;
pub use recovery::*;
pub use retry_policy::*;
pub use webhook::*;
