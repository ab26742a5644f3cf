mod client;
mod config;
mod device_repository;
mod group_repository;
mod inbox_repository;
mod message_repository;
mod owner_repository;

pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use group_repository::*;
pub use inbox_repository::*;
pub use message_repository::*;
pub use owner_repository::*;
