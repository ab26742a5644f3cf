mod reqwest_webhook_client;

pub use reqwest_webhook_client::*;
