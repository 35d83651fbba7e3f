//! Explicit resource route table. Handlers resolve the resource from `{module}/{resource}`.

use crate::extractors::require_bearer;
use crate::handlers::resource::{create, delete, list, read, update, update_status};
use crate::routes::method_not_allowed;
use crate::state::AppState;
use axum::{middleware, routing::get, Router};

/// | verb   | path                   | operation     |
/// |--------|------------------------|---------------|
/// | GET    | `/:module/:resource`     | list          |
/// | POST   | `/:module/:resource`     | create        |
/// | GET    | `/:module/:resource/:id` | read          |
/// | PUT    | `/:module/:resource/:id` | update        |
/// | PATCH  | `/:module/:resource/:id` | update status |
/// | DELETE | `/:module/:resource/:id` | delete        |
///
/// Any other verb on these paths is a 405 in the envelope.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:module/:resource", get(list).post(create).fallback(method_not_allowed))
        .route(
            "/:module/:resource/:id",
            get(read)
                .put(update)
                .patch(update_status)
                .delete(delete)
                .fallback(method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .with_state(state)
}
