//! Core domain types and utilities for obsidian-log.
//!
//! This crate provides the foundational types shared by the auth, content
//! and provider crates: the `Result` alias used at fallible boundaries,
//! strongly-typed identifiers, and an injectable wall clock.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Result;
pub use id::UserId;
