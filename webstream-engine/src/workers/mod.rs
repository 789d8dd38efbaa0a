//! Background workers: URL resolution and provider search

pub mod resolve;
pub mod search;

pub use resolve::{ResolveState, SharedResolveState, SourceKey};
pub use search::{SearchResult, SearchState, SearchStatus, SharedSearchState};
