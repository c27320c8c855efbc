//! Segno Account - session and access-control orchestration.
//!
//! This crate is the single source of truth for "who is the current user"
//! in a Segno client. It reconciles two independently-sourced records - the
//! identity provider's session and the profile document keyed by the same
//! subject id - into one [`models::User`] view-model, drives the
//! `loading -> authenticated | anonymous` machine every gated view depends
//! on, and stamps short-lived bearer tokens onto mutating API requests.
//!
//! # Architecture
//!
//! - [`identity`] - adapter over the external identity provider (sign-in,
//!   sign-up, sign-out, session-changed events, token refresh)
//! - [`profile`] - adapter over the remote profile document store
//! - [`session`] - the synchronizer merging both sources, with the
//!   sequence-numbered discard rule that keeps late profile fetches from
//!   clobbering newer sessions
//! - [`gate`] - the pure render/redirect decision table for protected and
//!   public-only destinations
//! - [`api`] - token-authorized requests against the Segno backend
//!
//! The view layer consumes this crate; nothing here renders, routes, or
//! persists anything itself.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod models;
pub mod profile;
pub mod session;

pub use api::{ApiClient, ApiError};
pub use config::{AccountConfig, ConfigError};
pub use error::AccountError;
pub use gate::{AccessGate, GateOutcome, RoutePolicy};
pub use identity::{IdentityError, IdentityHandle, IdentityProvider};
pub use models::{SessionState, User};
pub use profile::{ProfileError, ProfileRecord, ProfileStore, ProfileUpdate};
pub use session::{SessionEvents, SessionManager};
