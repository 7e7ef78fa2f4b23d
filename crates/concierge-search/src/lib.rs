//! # concierge-search
//!
//! Hybrid search plumbing: per-kind backends behind a [`router::SearchRouter`],
//! concurrent fragment fan-out, the deduplicating [`merger`], the tie-aware
//! [`ranker`], and the practice [`taxonomy`].
//!
//! ## Crate Position
//!
//! Depends on concierge-core. Depended on by concierge-engine.

pub mod backend;
pub mod merger;
pub mod ranker;
pub mod router;
pub mod taxonomy;
pub mod testing;

pub use backend::{SearchBackend, SearchError, SearchOptions};
pub use merger::{merge, FragmentHits, Merger};
pub use router::SearchRouter;
pub use taxonomy::{FamilyRef, StaticTaxonomy, Taxonomy};
