//! Common test utilities for integration tests.
//!
//! - `fixtures`: upstream mocks and a running proxy
//! - `logger`: structured per-test logging

#![allow(dead_code)]

pub mod fixtures;
pub mod logger;
