// End-to-end client for the calculator HTTP API.
pub mod calc;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod safety;
pub mod suite;

pub use client::{get, Client, DEFAULT_TIMEOUT};
pub use config::Config;
pub use error::ClientError;
pub use response::Response;
pub use safety::{is_safe_url, ALLOWED_HOSTS, ALLOWED_SCHEMES};
