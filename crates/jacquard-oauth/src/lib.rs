//! # Jacquard OAuth 2.1 implementation for the AT Protocol
//!
//! Implements the AT Protocol OAuth profile, including DPoP (Demonstrating
//! Proof-of-Possession), PKCE, PAR (Pushed Authorization Requests), and token management.
//!
//!
//! ## Authentication flow
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use jacquard_oauth::client::OAuthClient;
//! use jacquard_oauth::session::ClientData;
//! use jacquard_oauth::atproto::AtprotoClientMetadata;
//! use jacquard_oauth::authstore::MemoryAuthStore;
//! use jacquard_oauth::types::{AuthorizeOptions, CallbackParams};
//!
//! let store = MemoryAuthStore::new();
//!
//! // Create client with metadata
//! let client_data = ClientData {
//!     keyset: None,  // Will generate ES256 keypair if needed
//!     config: AtprotoClientMetadata::default_localhost(),
//! };
//! let oauth = OAuthClient::new(store, client_data);
//!
//! // Start auth flow: resolve the identifier, PAR, and redirect the user here
//! let authorize_url = oauth.start_auth("alice.bsky.social", AuthorizeOptions::default()).await?;
//!
//! // After the redirect back, exchange the code for a session
//! # let params: CallbackParams = unimplemented!();
//! let session = oauth.callback(params).await?;
//!
//! // Session handles token refresh automatically
//! # Ok(())
//! # }
//! ```
//!
//! ## AT Protocol specifics
//!
//! The AT Protocol OAuth profile adds:
//! - Required DPoP for all token requests
//! - PAR (Pushed Authorization Requests) for better security
//! - Specific scope format (`atproto`, `transition:generic`, etc.)
//! - Server metadata discovery at `/.well-known/oauth-authorization-server`
//!
//! See [`atproto`] module for AT Protocol-specific metadata helpers.

pub mod atproto;
pub mod authstore;
pub mod client;
pub mod config;
pub mod crypto;
pub mod dpop;
pub mod envelope;
pub mod error;
pub mod jose;
pub mod keyset;
pub mod origin;
pub mod pkce;
pub mod request;
pub mod resolver;
pub mod retry;
pub mod scopes;
pub mod session;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod utils;

pub const FALLBACK_ALG: &str = "ES256";
