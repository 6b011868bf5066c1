//! Use-case services.
//!
//! # Responsibility
//! - Wrap repositories with caller-friendly optional-input handling.
//! - Keep callers decoupled from storage details.

pub mod base_service;
