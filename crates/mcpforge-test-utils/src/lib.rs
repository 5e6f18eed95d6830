//! Shared PostgreSQL fixtures for mcpforge integration tests.
//!
//! One PostgreSQL server is shared by every test in a binary; each test
//! gets a freshly migrated database of its own through [`TestDb`].
//!
//! Set `MCPFORGE_TEST_PG_URL` (server root, no database name) to reuse an
//! already running server. Otherwise a `postgres:18` container is started
//! with testcontainers on first use.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use mcpforge_db::pool;

struct Server {
    root_url: String,
    /// Keeps the container alive for the lifetime of the test binary.
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(root_url) = std::env::var("MCPFORGE_TEST_PG_URL") {
        return Server {
            root_url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    Server {
        root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Root URL of the shared server (no database name).
pub async fn pg_url() -> &'static str {
    &SERVER.get_or_init(start_server).await.root_url
}

async fn connect(url: &str, max_connections: u32) -> PgPool {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {url}: {e}"))
}

/// A uniquely named, migrated database on the shared server.
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    /// Create and migrate a new database named `mcpforge_test_<uuid>`.
    pub async fn create() -> Self {
        let root = pg_url().await;
        let name = format!("mcpforge_test_{}", Uuid::new_v4().simple());

        let admin = connect(&format!("{root}/postgres"), 1).await;
        admin
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create database {name}: {e}"));
        admin.close().await;

        let pool = connect(&format!("{root}/{name}"), 5).await;
        pool::run_migrations(&pool)
            .await
            .expect("migrations should apply to a fresh database");

        Self { pool, name }
    }

    /// Close the pool and drop the database, terminating stray sessions.
    pub async fn teardown(self) {
        self.pool.close().await;

        let root = pg_url().await;
        let admin = connect(&format!("{root}/postgres"), 1).await;
        let _ = admin
            .execute(
                format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                     WHERE datname = '{}' AND pid <> pg_backend_pid()",
                    self.name
                )
                .as_str(),
            )
            .await;
        let _ = admin
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        admin.close().await;
    }
}
