//! arXiv research tool provider: `search_papers`, `extract_info` and
//! `generate_summary_prompt` served over MCP on stdio. Search results are
//! kept under a paper directory so later lookups work offline.

pub mod client;
pub mod config;
pub mod error;
pub mod store;
pub mod tools;

pub use client::{ArxivClient, Paper, PaperInfo};
pub use config::ArxivConfig;
pub use error::ArxivError;
pub use store::{Lookup, PaperStore};
