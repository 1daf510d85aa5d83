//! HTTP front end.

mod handlers;
mod router;

pub use handlers::{ApiState, QueryRequest};
pub use router::build_router;
