//! ArcGIS feature service access: the remote index query and per-feature edits.

pub mod client;
pub mod edits;
pub mod query;

pub use client::FeatureServiceClient;
pub use edits::UpdateResult;
