//! Subquery boundaries.
//!
//! A subquery runs once per row of its enclosing query. [`SubqueryStartExecutor`]
//! marks each run's end with a relevant shadow row, the body stages pass shadow
//! rows through, and [`SubqueryEndExecutor`] turns each run into one result row.

mod end;
mod start;

pub use end::{SubqueryEndExecutor, SubqueryEndInfos};
pub use start::SubqueryStartExecutor;
