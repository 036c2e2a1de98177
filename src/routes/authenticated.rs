use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// The recipe endpoints. Every route here sits behind the auth layer added in
/// `create_router`, and each handler also takes `AuthUser` so ownership checks in
/// the recipe lifecycle see the caller's current role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /recipes
        // The 8 most recent recipes, served from the read cache while it is fresh.
        // POST /recipes
        // Multipart create; the `image` part is required.
        .route(
            "/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        // GET/PUT/DELETE /recipes/{id}
        // Updates and deletes are owner-or-admin only.
        .route(
            "/recipes/{id}",
            get(handlers::get_recipe)
                .put(handlers::update_recipe)
                .delete(handlers::delete_recipe),
        )
}
