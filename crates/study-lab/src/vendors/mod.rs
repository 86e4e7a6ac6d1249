//! Vendor-specific backends.
pub mod openai;
