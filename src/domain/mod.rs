//! Domain types for the ingestion pipeline.
//!
//! - CallRecord: one call session from an input collection
//! - DownloadedAsset / AudioType: a fetched recording and its channel layout
//! - ClassifiedResult / FailedRecord: rows written to output collections

pub mod asset;
pub mod record;
pub mod result;

pub use asset::{recording_sid, AssetExtension, AudioType, DownloadedAsset};
pub use record::CallRecord;
pub use result::{ClassifiedResult, FailedRecord, FailureStage};
