use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod dashboard;
mod db;
mod digest;
mod error;
mod fields;
mod handlers;
mod mailer;
mod middleware;
mod models;
mod ownership;
mod query;
mod repository;
mod state;

#[cfg(test)]
mod tests;

use config::Config;
use mailer::{HttpMailer, LogMailer, Mailer};
use repository::TaskRepository;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::me,
        handlers::tasks::create_task,
        handlers::tasks::get_tasks,
        handlers::tasks::get_dashboard,
        handlers::tasks::get_task,
        handlers::tasks::update_task,
        handlers::tasks::patch_task,
        handlers::tasks::delete_task,
        handlers::tasks::delete_tasks
    ),
    components(
        schemas(
            models::User,
            models::RegisterUser,
            models::LoginRequest,
            models::Token,
            models::Task,
            models::TaskStatus,
            models::TaskType,
            models::CreateTask,
            models::UpdateTask,
            models::DeletedCount,
            dashboard::DashboardSummary,
            dashboard::ProgressChart
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "tasks", description = "Task management and dashboard")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    error::set_expose_detail(config.environment.exposes_error_detail());

    let pool = db::establish_connection(&config.database_url).await?;
    let state = AppState::new(pool, config);

    if state.config.digest.enabled {
        let mailer: Arc<dyn Mailer> = match state.config.mail.clone() {
            Some(mail) => Arc::new(HttpMailer::new(mail)),
            None => {
                tracing::warn!("MAIL_API_URL not set, digests will only be logged");
                Arc::new(LogMailer)
            }
        };
        digest::spawn(
            TaskRepository::new(state.pool.clone()),
            mailer,
            state.config.digest.hour,
        );
    }

    let addr = state.config.bind_addr;
    let app = create_app(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .route("/users/register", post(handlers::auth::register))
        .route("/users/login", post(handlers::auth::login))
        .route("/users/me", get(handlers::auth::me))
        .route(
            "/tasks",
            get(handlers::tasks::get_tasks)
                .post(handlers::tasks::create_task)
                .delete(handlers::tasks::delete_tasks),
        )
        .route("/tasks/dashboard/:type", get(handlers::tasks::get_dashboard))
        .route(
            "/tasks/:id",
            get(handlers::tasks::get_task)
                .put(handlers::tasks::update_task)
                .patch(handlers::tasks::patch_task)
                .delete(handlers::tasks::delete_task),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
