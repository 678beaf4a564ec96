//! HTTP interface: vehicle queries, status and the live event stream.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::create_router;
pub use state::AppState;
