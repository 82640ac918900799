//! Ephemeral artifact publishing: the in-memory registry of published
//! decks, the TTL sweep that bounds its growth, and the publish operation
//! that turns a freshly generated file into a download link.

mod lock;
pub mod publish;
pub mod reaper;
pub mod store;

pub use publish::{Published, Publisher};
pub use store::{ArtifactEntry, ArtifactStore, Lookup};
