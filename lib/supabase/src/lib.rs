//! Supabase integration for obsidian-log.
//!
//! `SupabaseClient` talks to a Supabase project's GoTrue auth API and its
//! PostgREST `admins` table. It implements both seams of the auth crate:
//! - `IdentityProvider`: sessions, GitHub OAuth redirects, refresh, sign-out
//!   and a broadcast of `SIGNED_IN` / `SIGNED_OUT` / `TOKEN_REFRESHED`
//! - `AdminCheck`: membership in the `admins` allow-list, where transport
//!   and server failures are inconclusive rather than a denial
//!
//! Sessions are persisted through any `CacheStorage`, so a CLI keeps its
//! sign-in across runs with `FileStorage` and tests use `MemoryStorage`.

pub mod client;
pub mod config;
pub mod error;
mod wire;

pub use client::{SESSION_STORAGE_KEY, SupabaseClient};
pub use config::SupabaseConfig;
pub use error::SupabaseError;
