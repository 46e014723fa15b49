//! Integration tests for pulse-dash.
//!
//! These tests verify the interaction between components:
//! - Event stream connection lifecycle against a real socket
//! - Cache invalidation driven by push notifications
//! - Dashboard refresh through the request client

#[macro_use]
pub mod common;
