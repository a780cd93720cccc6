use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{authenticate, authorize_roles};
use crate::auth::RequiredRoles;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes -- no credentials required
    let public_routes = Router::new()
        .route("/registration", post(handlers::register))
        .route("/activate-user", post(handlers::activate_user))
        .route("/login", post(handlers::login))
        .route("/social-auth", post(handlers::social_auth))
        .route("/refresh", get(handlers::refresh))
        .route("/courses", get(handlers::list_courses))
        .route("/courses/{id}", get(handlers::get_course))
        .route("/_internal/health", get(handlers::health));

    // Any authenticated principal. Layers run bottom-up: authenticate first.
    let user_routes = Router::new()
        .route("/logout", get(handlers::logout))
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        .route("/me/password", put(handlers::update_password))
        .route("/me/avatar", put(handlers::update_avatar))
        .route("/courses/{id}/content", get(handlers::get_course_content))
        .route("/courses/{id}/reviews", post(handlers::add_review))
        .route(
            "/courses/{id}/lessons/{lesson_id}/questions",
            post(handlers::add_question),
        )
        .route(
            "/courses/{id}/lessons/{lesson_id}/questions/{question_id}/answers",
            post(handlers::add_answer),
        )
        .route_layer(middleware::from_fn_with_state(
            RequiredRoles::any(),
            authorize_roles,
        ))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            authenticate,
        ));

    // Admin only
    let admin_routes = Router::new()
        .route("/courses", post(handlers::create_course))
        .route(
            "/courses/{id}",
            put(handlers::edit_course).delete(handlers::delete_course),
        )
        .route(
            "/courses/{id}/reviews/{review_id}/replies",
            post(handlers::reply_to_review),
        )
        .route("/admin/courses", get(handlers::list_admin_courses))
        .route("/admin/users", get(handlers::list_admin_users))
        .route("/admin/users/{id}", delete(handlers::delete_user))
        .route("/admin/users/{id}/role", put(handlers::update_user_role))
        .route_layer(middleware::from_fn_with_state(
            RequiredRoles::ADMIN,
            authorize_roles,
        ))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            authenticate,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes);

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
