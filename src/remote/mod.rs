//! # Remote Edit Module
//!
//! The boundary to the AI image edit service: instruction building,
//! quota-aware retry with exponential backoff, response validation, and a
//! Gemini HTTP adapter.

pub mod client;
pub mod retry;
pub mod service;

pub use client::RemoteEditClient;
pub use retry::RetryPolicy;
pub use service::{EditRequest, EditResponse, GeminiEditService, ImageEditService, ResponsePart};
