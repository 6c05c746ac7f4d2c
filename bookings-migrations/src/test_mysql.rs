//! MySQL test infrastructure.
//!
//! Starts one MySQL container for the whole test run and hands every test its own database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use mysql::prelude::*;
use mysql::{Conn, Pool};
use testcontainers::core::logs::LogFrame;
use testcontainers::runners::AsyncRunner;
use testcontainers::{GenericImage, ImageExt};
use uuid::Uuid;

const ROOT_PASSWORD: &str = "rootpw";

/// Runtime the container is started on. Kept alive for the whole test run.
static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

/// Host port of the shared container, set once it accepts connections.
static MYSQL_PORT: OnceLock<u16> = OnceLock::new();

fn mysql_port() -> u16 {
    *MYSQL_PORT.get_or_init(|| {
        let rt = RUNTIME
            .get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"));
        rt.block_on(start_mysql())
    })
}

/// Start a MySQL 8.4 container and wait until the real server (not the one the image uses
/// for initialization) is ready.
async fn start_mysql() -> u16 {
    let temporary_server_started = Arc::new(AtomicBool::new(false));
    let mysql_ready = Arc::new(AtomicBool::new(false));
    let temp_clone = Arc::clone(&temporary_server_started);
    let ready_clone = Arc::clone(&mysql_ready);

    let log_consumer = move |log: &LogFrame| {
        let msg = format!("{:?}", log);
        if msg.contains("Temporary server started") {
            temp_clone.store(true, Ordering::SeqCst);
        } else if temp_clone.load(Ordering::SeqCst)
            && msg.contains("/usr/sbin/mysqld: ready for connections")
        {
            ready_clone.store(true, Ordering::SeqCst);
        }
    };

    let image = GenericImage::new("mysql", "8.4")
        .with_log_consumer(log_consumer)
        .with_env_var("MYSQL_ROOT_PASSWORD", ROOT_PASSWORD)
        .with_env_var("MYSQL_DATABASE", "bootstrap");

    let container = AsyncRunner::start(image)
        .await
        .expect("failed to start mysql docker image");

    while !mysql_ready.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("failed to get mysql port");

    // The container lives until the test process exits.
    std::mem::forget(container);

    port
}

fn url_with_db(db: &str) -> String {
    format!(
        "mysql://root:{}@127.0.0.1:{}/{}",
        ROOT_PASSWORD,
        mysql_port(),
        db
    )
}

/// Create a database with a unique name and return a pool and URL for it.
pub fn fresh_mysql_db() -> (Pool, String) {
    let admin = Pool::new(url_with_db("bootstrap").as_str()).expect("create admin pool");
    let mut admin = admin.get_conn().expect("failed to get admin conn");

    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .query_drop(format!(
            "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci",
            db_name
        ))
        .expect("failed to create test database");

    let url = url_with_db(&db_name);
    let pool = Pool::new(url.as_str()).expect("create test pool");
    (pool, url)
}

/// A single connection to a fresh database, along with a pool for the same database.
pub fn get_test_conn() -> (Pool, Conn) {
    let (pool, url) = fresh_mysql_db();
    let conn = Conn::new(url.as_str()).expect("failed to connect to test database");
    (pool, conn)
}

/// Create a WordPress `wp_options` table in the database behind `pool`.
pub fn create_options_table(pool: &Pool, table: &str) {
    pool.get_conn()
        .expect("failed to get conn")
        .query_drop(format!(
            "CREATE TABLE `{}` (
                option_id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
                option_name VARCHAR(191) NOT NULL DEFAULT '',
                option_value LONGTEXT NOT NULL,
                autoload VARCHAR(20) NOT NULL DEFAULT 'yes',
                PRIMARY KEY (option_id),
                UNIQUE KEY option_name (option_name)
            )",
            table
        ))
        .expect("failed to create options table");
}

/// Whether `table` exists in the connection's current database.
pub fn table_exists<Q: Queryable>(conn: &mut Q, table: &str) -> bool {
    conn.exec_first::<String, _, _>(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?",
        (table,),
    )
    .expect("failed to query information_schema")
    .is_some()
}
