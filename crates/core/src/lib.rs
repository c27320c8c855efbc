//! Segno Core - Shared types library.
//!
//! This crate provides the domain types shared by the Segno components:
//! - `account` - Session and access-control orchestration
//! - the frontend shells that consume it
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! provider SDKs. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for subject ids, emails, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
