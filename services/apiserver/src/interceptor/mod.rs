//! The interceptor chain.
//!
//! Composed outermost to innermost: validation → authentication and
//! authorization → token whitelist → rate limiting → scope resolution. The
//! same chain covers every RPC route; the validation layer buffers the JSON
//! body once and the later layers introspect the parsed form from the
//! request extensions.
use serde_json::Value;

pub mod authorize;
pub mod ratelimit;
pub mod scope;
pub mod validate;
pub mod whitelist;

/// The parsed request body, buffered by the validation layer so downstream
/// interceptors can inspect subject fields without consuming the stream.
#[derive(Debug, Clone)]
pub struct RpcBody {
    pub json: Value,
}
