//! EM field-strength estimation engine.
//!
//! Given a validated request (polygon region, grid resolution, altitude
//! slice, frequency bands and up to 50 radiating sources), the engine
//! produces one field-strength raster per band in dBμV/m plus per-cell
//! Top-3 contributor diagnostics. The computation is pure and synchronous:
//! geometry on an effective-earth sphere, directional antenna gain with
//! scan-peak semantics, free-space or two-ray propagation with atmospheric
//! extras, coherent power summation, and a no-data threshold.
//!
//! The optional `threading` feature parallelises row computation with rayon
//! without changing any output bit.

pub mod accumulator;
pub mod antenna;
pub mod engine;
pub mod error;
pub mod geodesy;
pub mod grid;
pub mod power;
pub mod propagation;
pub mod request;
pub mod result;

pub use engine::compute_field;
pub use error::EngineError;
pub use request::FieldRequest;
pub use result::{FieldResult, PointSample, ResultWriter};
