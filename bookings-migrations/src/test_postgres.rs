//! PostgreSQL test infrastructure.
//!
//! Starts one PostgreSQL container for the whole test run and hands every test its own
//! database.

use std::sync::OnceLock;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Default credentials for testcontainers-modules postgres
const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_DB: &str = "postgres";

/// Runtime the container is started on. Kept alive for the whole test run.
static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

static POSTGRES_PORT: OnceLock<u16> = OnceLock::new();

fn postgres_port() -> u16 {
    *POSTGRES_PORT.get_or_init(|| {
        let rt = RUNTIME
            .get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"));
        rt.block_on(async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");

            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("failed to get postgres port");

            // The container lives until the test process exits.
            std::mem::forget(container);

            port
        })
    })
}

fn url_with_db(db: &str) -> String {
    format!(
        "postgres://{}:{}@127.0.0.1:{}/{}",
        PG_USER,
        PG_PASSWORD,
        postgres_port(),
        db
    )
}

/// Create a database with a unique name and return its URL.
pub fn fresh_postgres_db() -> String {
    let mut admin =
        Client::connect(&url_with_db(PG_DB), NoTls).expect("failed to connect as admin");

    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .batch_execute(&format!("CREATE DATABASE \"{}\"", db_name))
        .expect("failed to create test database");

    url_with_db(&db_name)
}

/// A client connected to a fresh, isolated database.
pub fn get_test_client() -> Client {
    connect(&fresh_postgres_db())
}

pub fn connect(url: &str) -> Client {
    Client::connect(url, NoTls).expect("failed to connect to test database")
}

/// Whether `table` exists in the client's database.
pub fn table_exists(client: &mut Client, table: &str) -> bool {
    client
        .query_opt(
            "SELECT 1 FROM information_schema.tables WHERE table_name = $1",
            &[&table],
        )
        .expect("failed to query information_schema")
        .is_some()
}
