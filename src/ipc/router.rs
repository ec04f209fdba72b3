use super::error::HandlerErr;
use super::handlers;
use super::types::{AppState, Request};

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::classes::try_handle,
    handlers::grades::try_handle,
    handlers::calc::try_handle,
    handlers::settings::try_handle,
    handlers::backup_exchange::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for handle in HANDLERS {
        if let Some(resp) = handle(state, &req) {
            return resp;
        }
    }
    tracing::debug!(method = %req.method, "unknown method");
    HandlerErr::new("not_implemented", format!("unknown method: {}", req.method))
        .into_response(&req.id)
}
