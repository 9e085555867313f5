//! pwacache Core Library
//!
//! This crate provides the worker configuration and the request/response
//! model shared by the offline engine and its tooling.

pub mod config;
pub mod types;

pub use config::{
    PrecacheConfig, PrecachePolicy, PushConfig, RoutingConfig, StrategyKind, WorkerConfig,
};
pub use types::{
    CacheMode, CachedEntry, CredentialsMode, Destination, RedirectMode, Request, RequestKey,
    RequestMode, Response, ResponseSource, VersionTag,
};
