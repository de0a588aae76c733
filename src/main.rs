mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::{
    account::{delete_session_handler, list_sessions_handler},
    audit::{
        audit_statistics_handler, compliance_report_handler, get_audit_log_handler,
        list_audit_logs_handler, security_events_handler,
    },
    auth::{login_handler, me_handler, register_handler},
    clients::{
        create_client_handler, delete_client_handler, get_client_handler, list_clients_handler,
        update_client_handler,
    },
    oauth::{
        authorize_handler, consent_handler, introspect_handler, jwks_handler,
        openid_configuration_handler, revoke_handler, token_handler, userinfo_handler,
    },
    permissions::{
        create_permission_handler, delete_permission_handler, get_permission_handler,
        list_permissions_handler, update_permission_handler,
    },
    roles::{
        assign_role_permission_handler, create_role_handler, delete_role_handler,
        get_role_handler, list_roles_handler, remove_role_permission_handler,
        role_permissions_handler, update_role_handler,
    },
    scopes::{
        create_scope_handler, delete_scope_handler, get_scope_handler, list_scopes_handler,
        update_scope_handler,
    },
    system::{create_backup_handler, list_backups_handler, restore_backup_handler},
    users::{
        activate_user_handler, assign_role_handler, create_user_handler, deactivate_user_handler,
        delete_user_handler, get_user_handler, grant_permission_handler, list_users_handler,
        lock_user_handler, remove_role_handler, revoke_permission_handler, unlock_user_handler,
        update_user_handler, user_permissions_handler, user_roles_handler,
    },
};
use crate::middleware::{
    authorize_rate_limit, bearer_auth_middleware, introspect_rate_limit, login_rate_limit,
    register_rate_limit, token_rate_limit,
};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check: one database round-trip.
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    // OAuth endpoints; client authentication happens inside the handlers.
    let oauth_routes = Router::new()
        .route(
            "/authorize",
            get(authorize_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                authorize_rate_limit,
            )),
        )
        .route("/authorize/consent", post(consent_handler))
        .route(
            "/token",
            post(token_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                token_rate_limit,
            )),
        )
        .route(
            "/introspect",
            post(introspect_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                introspect_rate_limit,
            )),
        )
        .route(
            "/revoke",
            post(revoke_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                introspect_rate_limit,
            )),
        );

    // UserInfo requires a bearer access token.
    let oauth_protected_routes = Router::new()
        .route("/userinfo", get(userinfo_handler).post(userinfo_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    let auth_routes = Router::new()
        .route(
            "/register",
            post(register_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                register_rate_limit,
            )),
        )
        .route(
            "/login",
            post(login_handler).layer(axum_middleware::from_fn_with_state(
                state.clone(),
                login_rate_limit,
            )),
        );

    let auth_protected_routes = Router::new()
        .route("/me", get(me_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    // Admin surface; every handler checks its required permission through
    // the decider.
    let admin_routes = Router::new()
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/:id",
            get(get_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )
        .route("/users/:id/activate", post(activate_user_handler))
        .route("/users/:id/deactivate", post(deactivate_user_handler))
        .route("/users/:id/lock", post(lock_user_handler))
        .route("/users/:id/unlock", post(unlock_user_handler))
        .route(
            "/users/:id/roles",
            get(user_roles_handler).post(assign_role_handler),
        )
        .route("/users/:id/roles/:role_id", delete(remove_role_handler))
        .route(
            "/users/:id/permissions",
            get(user_permissions_handler).post(grant_permission_handler),
        )
        .route(
            "/users/:id/permissions/:permission_id",
            delete(revoke_permission_handler),
        )
        .route(
            "/clients",
            get(list_clients_handler).post(create_client_handler),
        )
        .route(
            "/clients/:id",
            get(get_client_handler)
                .put(update_client_handler)
                .delete(delete_client_handler),
        )
        .route("/roles", get(list_roles_handler).post(create_role_handler))
        .route(
            "/roles/:id",
            get(get_role_handler)
                .put(update_role_handler)
                .delete(delete_role_handler),
        )
        .route(
            "/roles/:id/permissions",
            get(role_permissions_handler).post(assign_role_permission_handler),
        )
        .route(
            "/roles/:id/permissions/:permission_id",
            delete(remove_role_permission_handler),
        )
        .route(
            "/permissions",
            get(list_permissions_handler).post(create_permission_handler),
        )
        .route(
            "/permissions/:id",
            get(get_permission_handler)
                .put(update_permission_handler)
                .delete(delete_permission_handler),
        )
        .route("/scopes", get(list_scopes_handler).post(create_scope_handler))
        .route(
            "/scopes/:id",
            get(get_scope_handler)
                .put(update_scope_handler)
                .delete(delete_scope_handler),
        )
        .route("/audit-logs", get(list_audit_logs_handler))
        .route("/audit-logs/statistics", get(audit_statistics_handler))
        .route("/audit-logs/security-events", get(security_events_handler))
        .route(
            "/audit-logs/compliance-reports",
            get(compliance_report_handler),
        )
        .route("/audit-logs/:id", get(get_audit_log_handler))
        .route("/account/sessions", get(list_sessions_handler))
        .route("/account/sessions/:id", delete(delete_session_handler))
        .route(
            "/system/backups",
            get(list_backups_handler).post(create_backup_handler),
        )
        .route("/system/backups/:id/restore", post(restore_backup_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    let wellknown_routes = Router::new()
        .route("/jwks.json", get(jwks_handler))
        .route("/openid-configuration", get(openid_configuration_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .nest("/.well-known", wellknown_routes)
        .nest("/api/v2/oauth", oauth_routes)
        .nest("/api/v2/oauth", oauth_protected_routes)
        .nest("/api/v2/auth", auth_routes)
        .nest("/api/v2/auth", auth_protected_routes)
        .nest("/api/v2", admin_routes)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    // Aborts with a non-zero exit when signing configuration is missing.
    let config = Config::from_env()?;

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let addr = config.socket_addr();
    let cleanup_interval = config.cleanup_interval_secs;
    let state = AppState::new(pool.clone(), config)?;

    tokio::spawn(services::run_cleanup_loop(pool, cleanup_interval));

    let app = create_router(state);

    tracing::info!(
        "authd v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }
}