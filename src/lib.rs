//! callharvest - Call recording ingestion
//!
//! Reads exported call logs, downloads each call's recordings from Twilio,
//! classifies them as mono or dual channel with ffprobe, and streams the
//! results into append-only JSON collections.
//!
//! # Architecture
//!
//! One run is a bounded-concurrency fan-out:
//! - Every qualifying call becomes one task: list recordings, then fetch,
//!   classify and route each recording in turn
//! - Output collections are streamed to disk row by row and only closed
//!   at the end of the run
//! - Reopening a collection continues it, and calls already recorded are
//!   skipped, so runs can be repeated
//!
//! # Modules
//!
//! - `adapters`: External system integrations (Twilio, ffprobe)
//! - `core`: Ingestion logic (RateLimiter, AssetFetcher, OutputCollections, Orchestrator)
//! - `domain`: Data structures (CallRecord, DownloadedAsset, ClassifiedResult)
//! - `config`: Config file discovery and the default data layout
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest every call in data/to-download/*.json
//! callharvest run
//!
//! # Use the "closers" account, 5 calls at a time
//! callharvest run --account closers --concurrency 5
//!
//! # List calls that still have no outcome
//! callharvest remaining --input data/to-download/calls.json
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{FfprobeAdapter, MediaProbe, RecordingSource, TwilioClient};
pub use core::{IngestSettings, Orchestrator, RunLayout, RunSummary};
pub use domain::{AudioType, CallRecord, ClassifiedResult};
