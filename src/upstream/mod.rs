//! The HTTP client used to exchange codes and refresh tokens against the
//! upstream identity provider (Sentry).

pub mod client;

pub use client::{UpstreamClient, UpstreamTokenResponse};
