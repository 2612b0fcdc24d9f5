//! Shared utility functions for frontier-forge.
//!
//! Typed environment-variable parsing for the `from_env` constructors, and
//! JSON extraction from LLM responses.

pub mod env;
pub mod json_extraction;

pub use json_extraction::{extract_json, find_matching_brace, parse_json_response};
