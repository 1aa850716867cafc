//! # cliunit - CLI configuration translation engine
//!
//! `cliunit` is a Rust library for translating between network-device CLI
//! text and a normalized, path-addressed configuration model. Vendor
//! "translation units" register readers (scrape `show` output into model
//! objects) and writers (render model objects into command scripts) against a
//! generic engine that composes them, orders writes by declared dependencies,
//! and executes everything over a serialized per-device session.
//!
//! ## Features
//!
//! - **Field Extraction**: line-oriented regex primitives with distinct and
//!   non-distinct collection modes, plus fixed-width table parsing
//! - **Command Rendering**: whitespace-exact templates with conditionals,
//!   loops and three-valued set/clear/leave-alone switches
//! - **Composite Pipelines**: ordered child readers merge field-by-field into
//!   one builder; the first writer child to claim a model wins
//! - **Write Ordering**: dependency edges between writers are data, resolved
//!   once into a total order; cycles are rejected at startup
//! - **Per-Transaction Caching**: expensive scrapes are shared by sibling
//!   reads of one transaction and never leak across transactions
//! - **Serialized Sessions**: one worker per device session, so commands from
//!   concurrent transactions never interleave on the wire
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cliunit::dialect;
//! use cliunit::session::{CliSession, ExchangeRecord, ReplayTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // An offline transport replaying recorded device output; live devices
//!     // use `SessionManager::connect` with `SshSettings` instead.
//!     let transport = ReplayTransport::new(vec![ExchangeRecord::new(
//!         "show vlan 12",
//!         "vlan 12\n name up\n",
//!     )]);
//!     let session = CliSession::spawn(Box::new(transport), Arc::new(dialect::cisco()?));
//!
//!     let output = session.execute("show vlan 12").await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`registry::Translator`] - Composes translation units, serves reads and
//!   ordered commits
//! - [`session::CliSession`] - Serialized command execution against one device
//! - [`extract`] / [`render`] - The scrape and render primitives handlers use
//! - [`schedule::WriteOrderBuilder`] - Writer dependency registration
//! - [`dialect`] - Vendor dialect data (error patterns, mode wrappers)
//! - [`error::TranslateError`] - Error taxonomy for reads, writes and ordering

pub mod cache;
pub mod composite;
pub mod dialect;
pub mod error;
pub mod extract;
pub mod handler;
pub mod model;
pub mod path;
pub mod registry;
pub mod render;
pub mod schedule;
pub mod session;
