//! Core types for Turnstile.

pub mod message;

pub use message::*;
