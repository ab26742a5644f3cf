pub mod domain;
mod routing_engine;

pub use domain::*;
pub use routing_engine::*;
