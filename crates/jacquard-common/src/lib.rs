#[macro_use]
pub mod cowstr;
#[macro_use]
pub mod into_static;

pub mod error;
pub mod http_client;
#[cfg(feature = "websocket")]
pub mod jetstream;
#[cfg(feature = "service-auth")]
pub mod service_auth;
pub mod session;
pub mod stream;
pub mod types;
#[cfg(feature = "websocket")]
pub mod websocket;
pub mod xrpc;

pub use cowstr::CowStr;
pub use http_client::{AuthorizationToken, HttpClient};
pub use into_static::IntoStatic;
#[cfg(feature = "streaming")]
pub use stream::ByteStream;
pub use types::value::Data;

pub use smol_str;
pub use url;
