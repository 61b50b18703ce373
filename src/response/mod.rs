// src/response/mod.rs
// Response Shaper (C8).

pub mod shaper;

pub use shaper::{shape, large_content_warnings, JsonResponse, OutputFormat, ShapeRequest};
