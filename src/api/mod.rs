//! HTTP route layer
//!
//! Thin axum handlers adapting (method, path, headers, body) tuples onto
//! the pure federation core. Everything interesting happens below; the
//! handlers only translate.

mod activitypub;
mod wellknown;

pub use activitypub::activitypub_router;
pub use wellknown::wellknown_router;
