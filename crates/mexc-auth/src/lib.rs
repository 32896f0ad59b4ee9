//! Request signing and listen key provider for the MEXC API
//!
//! This crate covers the small slice of the REST surface the stream client
//! depends on: HMAC-SHA256 request signing, the futures login signature, and
//! the listen key lifecycle for private spot streams.
//!
//! # Example
//!
//! ```no_run
//! use mexc_auth::{Credentials, ListenKeyProvider, RestClient, RestListenKeyProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load credentials from environment
//!     let creds = Credentials::from_env()?;
//!
//!     // Listen keys are issued through the signed REST endpoints
//!     let provider = RestListenKeyProvider::new(RestClient::new(creds)?);
//!
//!     let key = provider.create_listen_key().await?;
//!     println!("Listen key: {}", key.token);
//!
//!     Ok(())
//! }
//! ```

mod credentials;
mod error;
mod listen_key;
mod rest;

pub use credentials::{timestamp_ms, Credentials};
pub use error::{AuthError, AuthResult};
pub use listen_key::{ListenKey, ListenKeyProvider, RestListenKeyProvider, LISTEN_KEY_TTL};
pub use rest::{Method, RestClient, SignedRest, SPOT_REST_URL};
