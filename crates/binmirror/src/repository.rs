//! Persistence for the mirrored directory tree.
//!
//! Nodes are addressed by `(category, parent, name)` and only ever inserted
//! or updated; the engine never deletes them.

mod errors;
mod query;
mod single;

pub use errors::{RepositoryError, Result, is_retryable_error};
pub use query::{count_by_category, count_missing, list, list_categories};
pub use single::{find, mark_missing, save, save_with_retry, validate_address};
