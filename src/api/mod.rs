// HTTP and WebSocket APIs

pub mod layout;
pub mod websocket;

pub use layout::{create_layout_router, LayoutAppState};
pub use websocket::{create_ws_router, ws_handler};

use axum::Router;
use tower_http::cors::CorsLayer;

/// Full API: layout routes plus the change-notification socket
pub fn create_router(state: LayoutAppState, cors: bool) -> Router {
    let router = create_layout_router(state.clone()).merge(create_ws_router(state));
    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
