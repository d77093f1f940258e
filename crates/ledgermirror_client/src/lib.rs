//! # LedgerMirror Client
//!
//! Blocking HTTP client for the accounting API.
//!
//! [`ReqwestClient`] implements the engine's
//! [`HttpClient`](ledgermirror_engine::HttpClient) seam: it obtains an
//! OAuth2 access token with the password grant on first use and attaches it
//! to every request. [`connect`] wires it into an
//! [`HttpTransport`](ledgermirror_engine::HttpTransport).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;

pub use client::{connect, ReqwestClient};
pub use config::{ClientConfig, DEFAULT_AUTH_URL, DEFAULT_BASE_URL, REQUIRED_ENV_VARS};
pub use error::{ClientError, ClientResult};
