//! # android-collector
//!
//! An Android evidence acquisition engine: it pulls messages, call records,
//! browsing history, contacts, calendar entries, app usage and shared
//! storage metadata off a connected device, verifies every acquired file,
//! keeps it in an append-only case directory and merges everything into
//! one chronological timeline.
//!
//! ## Overview
//!
//! Devices rarely allow every acquisition channel. For each artifact kind
//! the engine walks a configured fallback chain (direct copy with root,
//! device backup container, content provider query, system service dump)
//! and stops at the first method whose output passes verification. Every
//! attempt, failed or not, is logged with a reason and a remediation hint.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use android_collector::config::EngineConfig;
//! use android_collector::engine::Engine;
//! use android_collector::transport::AdbTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let transport = AdbTransport::new(config.command_timeout());
//! let engine = Engine::new(Arc::new(transport), config);
//!
//! let mut run = engine.start_acquisition("CASE-2024-001")?;
//! while let Some(event) = run.next_event().await {
//!     println!("[{:>3}%] {}", event.percent, event.message);
//! }
//! let report = run.wait().await?;
//! println!("{} targets acquired", report.acquired());
//!
//! let timeline = engine.build_timeline("CASE-2024-001")?;
//! for record in timeline.search("whatsapp") {
//!     println!("{:?} {}", record.timestamp, record.summary());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`]: background runs, progress, cancellation and case queries
//! - [`collectors`]: acquisition strategy selection and fallback chains
//! - [`backup`]: backup container decoding
//! - [`verifier`]: structural checks and integrity hashing
//! - [`case`]: case directories, event log, summaries and reports
//! - [`timeline`]: normalization of artifacts into one timeline
//! - [`transport`]: device command boundary and the adb adapter
//! - [`config`]: artifact kinds, acquisition methods and YAML configuration

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Error taxonomy with remediation hints
pub mod error;

/// Acquisition strategy selection
pub mod collectors;

/// Backup container decoding
pub mod backup;

/// Artifact verification
pub mod verifier;

/// Case directories and the evidence log
pub mod case;

/// Timeline normalization and export
pub mod timeline;

/// Device transport boundary
pub mod transport;

/// Background acquisition runs and the presentation-facing API
pub mod engine;

/// Utility functions for hashing and content query text
pub mod utils;

/// Configuration management and acquisition targets
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Path validation for case ids, stored files and extracted entries
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
