//! Outbound HTTP for API steps.

pub mod reqwest_client;

pub use reqwest_client::ReqwestHttpClient;
