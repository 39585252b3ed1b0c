//! Waste sorting detection service.
//!
//! Turns object-detector labels into disposal guidance.
//!
//! # Module Structure
//!
//! - `category`: waste category table and the label resolver
//! - `detect`: detection records, detector backends (stub, ONNX via tract), YOLO decoding
//! - `api`: HTTP detection service
//! - `config`: service configuration (JSON file + environment)

pub mod api;
pub mod category;
pub mod config;
pub mod detect;

pub use category::{
    CategoryOutput, CategoryResolver, CategoryTable, MatchKind, MatchPolicy, Resolution,
    WasteCategory, WasteCategoryEntry,
};
pub use detect::{BoundingBox, DetectionResult, DetectorBackend};
