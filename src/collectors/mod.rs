//! Acquisition strategy selection.
//!
//! Every artifact kind has a configured chain of acquisition methods. The
//! selector walks that chain for one target at a time:
//!
//! ```text
//! DirectCopy ──fail──▶ Backup ──fail──▶ ContentQuery / SystemDump
//!     │                  │                   │
//!     └──────────────────┴───────────────────┴──▶ store ─▶ verify ─▶ attempt log
//! ```
//!
//! A method counts as successful only when its stored output passes
//! verification; anything else is logged as a failed attempt and the next
//! method runs. Direct copies are only tried with elevated device access.
//!
//! ## Usage Example
//!
//! ```no_run
//! use android_collector::case::CaseStore;
//! use android_collector::collectors::{preflight, StrategySelector};
//! use android_collector::config::EngineConfig;
//! use android_collector::transport::AdbTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let transport = AdbTransport::new(config.command_timeout());
//! let session = preflight(&transport, &config).await?;
//!
//! let case = CaseStore::new(&config.evidence_root).open_or_create("CASE-1")?;
//! let run = case.begin_run()?;
//! let mut selector = StrategySelector::new(&transport, &config, &run, session.elevated);
//! for target in &config.targets {
//!     let report = selector.acquire_target(target).await?;
//!     println!("{}: {} attempt(s)", report.kind, report.attempts.len());
//! }
//! # Ok(())
//! # }
//! ```

/// Choosing the right entry out of a decoded backup
pub mod backup_match;

/// Permission error tracking and reporting
pub mod permission_tracker;

/// Preflight checks and the per-target fallback chain
pub mod selector;

mod strategy;

pub use permission_tracker::PermissionTracker;
pub use selector::{preflight, DeviceSession, StrategySelector, TargetReport};
