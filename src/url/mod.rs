//! URL normalization and domain matching
//!
//! Pure functions with no dependencies on the rest of the crawler. These are
//! the first gates a discovered URL passes through before it is considered
//! for fetching.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_same_domain};
pub use normalize::normalize_url;
