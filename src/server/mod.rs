//! HTTP front-end
//!
//! - `config`: listener and request limits
//! - `router`: path/method/bearer checks, body hashing, store lookup, attach
//! - `listener`: server runner with graceful shutdown
//! - `error`: JSON error responses

pub mod config;
pub mod error;
pub mod listener;
pub mod router;

pub use config::ServerConfig;
pub use error::ProxyError;
pub use listener::ProxyServer;
pub use router::{proxy_router, ProxyState, CACHE_STATUS_HEADER};
