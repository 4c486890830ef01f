//! HTTP API
//! Mission: Assemble the access-control pipeline around every route
//!
//! Request flow: admission check → bearer verification → identity resolution
//! (cached) → typed `CurrentUser` → handler → ownership/role gate on mutations.

pub mod authentication;
pub mod errors;
pub mod health;
pub mod posts;
pub mod users;

use crate::auth::{
    auth_middleware, basic_auth_middleware, IdentityResolver, JwtHandler, RoleResolver,
};
use crate::cache::UserCache;
use crate::config::Config;
use crate::middleware::{rate_limit_middleware, request_logging, RateLimiter};
use crate::store::Storage;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Storage,
    pub jwt: Arc<JwtHandler>,
    pub identities: Arc<IdentityResolver>,
    pub roles: Arc<RoleResolver>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// `cache` is only wired into identity resolution when caching is enabled
    /// in `config`; otherwise it is dropped and never consulted.
    pub fn new(config: Config, store: Storage, cache: Option<Arc<dyn UserCache>>) -> Self {
        let cache = cache.filter(|_| config.cache.enabled);

        Self {
            jwt: Arc::new(JwtHandler::new(&config.auth.token)),
            identities: Arc::new(IdentityResolver::new(store.users.clone(), cache)),
            roles: Arc::new(RoleResolver::new(store.roles.clone())),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            store,
            config: Arc::new(config),
        }
    }
}

/// Build the full router. The rate limiter is only installed when enabled.
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/v1/users/:id", get(users::get_user_handler))
        .route("/v1/posts", post(posts::create_post_handler))
        .route(
            "/v1/posts/:id",
            get(posts::get_post_handler)
                .patch(posts::update_post_handler)
                .delete(posts::delete_post_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let operator_routes = Router::new()
        .route("/v1/debug/stats", get(health::debug_stats_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            basic_auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/v1/health", get(health::health_handler))
        .route(
            "/v1/authentication/user",
            post(authentication::register_user_handler),
        )
        .route(
            "/v1/authentication/token",
            post(authentication::create_token_handler),
        )
        .route(
            "/v1/users/activate/:token",
            put(users::activate_user_handler),
        );

    let mut app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(operator_routes);

    if state.config.rate_limit.enabled {
        app = app.layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));
    }

    app.layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
