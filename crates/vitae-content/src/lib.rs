//! `vitae-content` — the listing corpus (jobs, venues, events, companies,
//! blog posts) and the saved-search evaluator that alert tasks run against it.

pub mod db;
pub mod error;
pub mod search;
pub mod store;
pub mod types;

pub use error::{ContentError, Result};
pub use search::{ContentSearch, SearchCriteria};
pub use store::ContentStore;
pub use types::{NewPost, ParentSummary, Post, PostKind, PostStatus, SearchHit};
