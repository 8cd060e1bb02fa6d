pub mod client;
pub mod types;

pub use client::InverterClient;
pub use types::EndpointPayload;
