//! Shared test utilities for wxdraft integration tests.
//!
//! This module provides:
//! - `TestHarness`, a pipeline over a temp media root and in-memory job store
//! - `ScriptedWeChat`, a `WeChatApi` double with call counters and scripted
//!   draft submission results
//! - Builders for articles and image fixtures

pub mod builders;
pub mod fake_wechat;
pub mod harness;

pub use builders::*;
pub use fake_wechat::ScriptedWeChat;
pub use harness::{RecordingProgress, TestHarness};
