use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod locks;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::set_routes())
        .merge(handlers::social_routes())
        .merge(locks::routes())
}
