//! Core ingestion logic.
//!
//! This module contains:
//! - RateLimiter: bounded-concurrency task admission
//! - AssetFetcher: recording downloads with a dual-channel first attempt
//! - MediaClassifier: mono/dual labelling via a media probe
//! - JsonArraySink / OutputCollections: streaming JSON array outputs
//! - OutputRouter: writes results and relocates mono files
//! - remaining: input records not yet present in any output collection
//! - Orchestrator: runs one ingestion pass end to end

pub mod classifier;
pub mod collection;
pub mod fetcher;
pub mod limiter;
pub mod orchestrator;
pub mod remaining;
pub mod router;

// Re-export commonly used types
pub use classifier::MediaClassifier;
pub use collection::{
    parse_rows, read_collection, CollectionCounts, CollectionError, CollectionPaths, ExistingState,
    JsonArraySink, OutputCollections, RecordedManifest,
};
pub use fetcher::{asset_id, dual_channel_url, AssetFetcher, FetchError};
pub use limiter::{RateLimiter, Settled, TaskHandle};
pub use orchestrator::{discover_sources, IngestSettings, Orchestrator, RunLayout, RunSummary};
pub use remaining::{recorded_call_sids, remaining_records, write_records};
pub use router::{OutputRouter, RouteError};
