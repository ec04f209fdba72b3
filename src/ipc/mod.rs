//! JSON-lines protocol: one `{id, method, params}` request per stdin line,
//! answered by one `{id, ok, result}` or `{id, ok: false, error}` line.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
