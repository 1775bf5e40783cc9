//! Shared utilities and common types for the Power Monitor backend.
//!
//! This crate provides functionality used across all other crates:
//! - JWT-based identity resolution for API and WebSocket clients
//! - Common validation logic (hardware addresses, schedules, timestamps)

pub mod jwt;
pub mod validation;
