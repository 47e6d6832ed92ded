//! LLM judge support for candidate re-ranking.
//!
//! This crate builds the judge prompt from a short list of hybrid-scored
//! candidates, talks to a chat-completion endpoint, and parses the judge's
//! structured verdict. It knows nothing about terminology lookups.

pub mod client;
pub mod prompts;
pub mod verdict;

pub use client::*;
pub use prompts::*;
pub use verdict::*;
