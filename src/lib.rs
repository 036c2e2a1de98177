use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod recipes;
pub mod repository;
pub mod storage;

// Module for routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use cache::{CacheState, MemoryReadCache, ReadCache};
pub use config::AppConfig;
pub use credentials::Credentials;
pub use error::AppError;
pub use recipes::RecipeService;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{AssetState, AssetStore, MockAssetStore, S3AssetStore};

/// Largest request body accepted, multipart image included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Prefix every API route is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and schema into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout,
        handlers::list_recipes, handlers::create_recipe, handlers::get_recipe,
        handlers::update_recipe, handlers::delete_recipe
    ),
    components(
        schemas(
            models::Role, models::AccountProfile, models::RegisterRequest,
            models::LoginRequest, models::LoginResponse, models::RecipeImage,
            models::Recipe, models::RecipeFields, models::DeletedRecipe,
        )
    ),
    tags(
        (name = "recipe-portal", description = "Recipe Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for the application's collaborators and configuration.
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Record store for accounts and recipes.
    pub repo: RepositoryState,
    /// Remote image store.
    pub assets: AssetState,
    /// Short-lived read cache for the recipe listing.
    pub cache: CacheState,
    /// Token signing keys and the password hashing cost.
    pub credentials: Credentials,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AssetState {
    fn from_ref(app_state: &AppState) -> AssetState {
        app_state.assets.clone()
    }
}

impl FromRef<AppState> for CacheState {
    fn from_ref(app_state: &AppState) -> CacheState {
        app_state.cache.clone()
    }
}

impl FromRef<AppState> for Credentials {
    fn from_ref(app_state: &AppState) -> Credentials {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`. Extracting `AuthUser` runs
/// the whole token check; on failure the extractor's rejection is returned and the
/// handler never runs. The resolved identity is stored in the request extensions so
/// the handler's own `AuthUser` argument does not hit the store a second time.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies global and scoped middleware, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Versioned API: public account routes plus the guarded recipe routes.
    let api = public::public_routes().merge(
        authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        )),
    );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::health_routes())
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS (outermost)
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with the `x-request-id` set by `SetRequestIdLayer`, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
