//! Core weft library (document model, event reducer, projection, wire).

pub mod core;
pub mod partial_json;
pub mod view;
pub mod wire;
