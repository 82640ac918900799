//! Deckmill converts Marp Markdown into PPTX slide decks and publishes each
//! generated deck under a short-lived HTTP download link.
//!
//! The crate is organised around the artifact lifecycle: [`artifacts`] owns
//! the published files (registry, TTL reaper, publish operation),
//! [`infra::http`] serves them, [`application`] drives the conversion
//! engine, and [`mcp`] exposes the single `generate_pptx` tool over a
//! line-oriented stdio protocol.

pub mod application;
pub mod artifacts;
pub mod config;
pub mod infra;
pub mod mcp;
pub mod util;
