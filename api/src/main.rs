mod error;
mod health;
mod postgres;
mod settings;
mod users;

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    serve, Router,
};
use settings::Settings;
use tokio::{net::TcpListener, signal, time::Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use users::{PgUserStore, UserStore};

#[derive(Clone)]
struct AppState {
    users: Arc<dyn UserStore>,
    database: String,
    host: String,
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/users", get(users::get_users))
        .route("/api/users", post(users::create_user))
        .route("/api/users/{id}", get(users::get_user_by_id))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let start = Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let pool = match postgres::bootstrap(&settings.postgres).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database setup failed: {e:#}");
            return Err(e);
        }
    };

    let app = create_app(AppState {
        users: Arc::new(PgUserStore::new(pool.clone())),
        database: settings.postgres.name.clone(),
        host: settings.postgres.host.clone(),
    });

    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("failed to bind port {}", settings.port))?;
    info!("Server running on {}", listener.local_addr()?);
    info!("API endpoints:");
    info!("   GET    /api/health");
    info!("   GET    /api/users");
    info!("   GET    /api/users/:id");
    info!("   POST   /api/users");

    let server = serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        error!("Server error: {}", e);
    }

    info!("Shutting down gracefully... in {:?}", start.elapsed());
    pool.close().await;
    info!("Database connection pool closed");

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix. Once it does, axum stops
/// accepting connections and drains the in-flight ones.
///
/// The SIGTERM handler is installed by the call itself, not on first poll.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| error!("failed to install SIGTERM handler: {}", e))
        .ok();

    async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum_test::TestServer;
    use chrono::Utc;
    use shared::User;
    use std::sync::Mutex;
    use tracing_test::traced_test;
    use users::StoreError;

    /// Keeps the same contract as the `users` table: serial ids, unique
    /// emails, newest first.
    #[derive(Default)]
    pub struct MemoryUserStore {
        users: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn list_recent(&self, limit: i64) -> Result<Vec<User>, StoreError> {
            let mut users = self.users.lock().unwrap().clone();
            users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            users.truncate(limit as usize);
            Ok(users)
        }

        async fn find(&self, id: i32) -> Result<Option<User>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|user| user.id == id).cloned())
        }

        async fn insert(&self, name: &str, email: &str) -> Result<User, StoreError> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|user| user.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
            let now = Utc::now().naive_utc();
            let user = User {
                id: users.len() as i32 + 1,
                name: name.to_string(),
                email: email.to_string(),
                created_at: now,
                updated_at: now,
            };
            users.push(user.clone());
            Ok(user)
        }
    }

    /// Every call fails the way an unreachable database would.
    pub struct FailingUserStore;

    #[async_trait]
    impl UserStore for FailingUserStore {
        async fn list_recent(&self, _: i64) -> Result<Vec<User>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }

        async fn find(&self, _: i32) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }

        async fn insert(&self, _: &str, _: &str) -> Result<User, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
    }

    fn server_with(users: Arc<dyn UserStore>) -> TestServer {
        let app = create_app(AppState {
            users,
            database: "test".to_string(),
            host: "localhost".to_string(),
        });
        TestServer::new(app).unwrap()
    }

    pub fn create_test_server() -> TestServer {
        server_with(Arc::new(MemoryUserStore::default()))
    }

    pub fn create_failing_test_server() -> TestServer {
        server_with(Arc::new(FailingUserStore))
    }

    #[cfg(unix)]
    #[tokio::test]
    #[traced_test]
    async fn test_sigterm_resolves_shutdown_signal() {
        let shutdown = shutdown_signal();

        // the handler installed above keeps the test process alive
        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        assert_eq!(rc, 0);

        tokio::time::timeout(std::time::Duration::from_secs(5), shutdown)
            .await
            .expect("SIGTERM did not trigger shutdown");
        assert!(logs_contain("Shutdown signal received"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let server = create_test_server();
        let response = server.get("/api/nope").await;
        assert_eq!(response.status_code(), 404);
    }
}
