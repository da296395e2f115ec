//! Share-link resolution engine for consumer cloud-storage services.
//!
//! Given a share URL (optionally password-protected), the engine identifies
//! the hosting provider, speaks its private share API, and produces either a
//! short-lived direct download URL (plus any headers the fetch must replay)
//! or the share's file tree. Compiled adapters cover the Lanzou application
//! family (ilanzou, feijipan) and Tencent Weiyun; additional providers can
//! be registered at runtime as scripts through [`script::ScriptExecutor`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod cli;
pub mod config;
pub mod engine;
pub mod model;
pub mod script;
pub mod sign;
pub mod transport;

pub use adapters::{Adapter, AdapterContext, ResolveStep, ScriptedAdapter};
pub use config::EngineConfig;
pub use engine::{Resolved, ResolveError, ResolvedLink, Router, build_default_router};
pub use model::{FileDescriptor, Provider, ShareDescriptor};
