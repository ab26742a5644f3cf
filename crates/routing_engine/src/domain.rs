mod candidate_filter;
mod group_seeder;
mod inbox_service;
mod message_ingestion_service;
mod network_range_service;
mod routing_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use candidate_filter::*;
pub use group_seeder::*;
pub use inbox_service::*;
pub use message_ingestion_service::*;
pub use network_range_service::*;
pub use routing_service::*;
