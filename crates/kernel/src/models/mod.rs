//! Database models.

pub mod engagement;
pub mod server;

pub use engagement::{EngagementAggregate, NewInstall, NewRating};
pub use server::ServerRow;
