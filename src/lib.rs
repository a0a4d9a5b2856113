//! # logshard
//!
//! Schema-sharded ingestion for free-form `key=value` logs.
//!
//! Log lines carry a variable set of fields. logshard discovers every
//! distinct ordered field set, writes one JSON-lines shard per set plus a
//! manifest, and rebuilds one table per shard in DuckDB and MotherDuck.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  parse   │──▶│ classify │──▶│  shard   │──▶│    store     │
//! │ line→rec │   │ by schema│   │ JSONL +  │   │ DuckDB local │
//! └──────────┘   └──────────┘   │ manifest │   │ MotherDuck   │
//!                               └──────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`parse`] | Line record parser |
//! | [`classify`] | Schema classifier |
//! | [`shard`] | Shard and manifest writer |
//! | [`store`] | Drop-and-reload sync, local and remote drivers |
//! | [`ingest`] | Pipeline orchestration |
//! | [`config`] | TOML configuration and CLI defaults |
//! | [`models`] | Core data types |
//! | [`ident`] | SQL identifier allowlist |
//! | [`progress`] | Sync progress reporting |
//! | [`signal`] | Ctrl-C cancellation |
//! | [`error`] | Error types |

pub mod classify;
pub mod config;
pub mod error;
pub mod ident;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod progress;
pub mod shard;
pub mod signal;
pub mod store;
