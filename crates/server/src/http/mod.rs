use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::{DeploymentImpl, routes};

mod auth;

pub use auth::AuthUser;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(routes::users::router())
        .merge(routes::workspaces::router(&deployment))
        .merge(routes::spaces::router(&deployment))
        .merge(routes::projects::router(&deployment))
        .merge(routes::sprints::router(&deployment))
        .merge(routes::tasks::router(&deployment))
        .merge(routes::comments::router())
        .merge(routes::labels::router())
        .merge(routes::notifications::router())
        .layer(from_fn_with_state(deployment.clone(), auth::require_auth))
        // registered after the layer so these stay public
        .merge(routes::auth::router());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
