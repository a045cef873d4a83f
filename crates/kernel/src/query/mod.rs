//! Listing query compilation.
//!
//! Client filters and sort tokens become parameterized SQL here:
//! [`filter`] holds the request, [`predicate`] compiles it into safe
//! conditions, [`sort`] resolves the ORDER BY whitelist, and [`plan`]
//! assembles the two-stage statement.

pub mod filter;
pub mod plan;
pub mod predicate;
pub mod sort;

pub use filter::{ServerFilter, split_list};
pub use plan::{BoundQuery, ListingPlan, build_collection, build_listing, build_lookup};
pub use sort::{DEFAULT_SORT, SortOrder};
