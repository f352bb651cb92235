//! Exercises the `PostgreSQL` collaborator against a real server.
//!
//! Set `PG_CONN_TEST_URL` to a libpq connection string and enable the
//! `live-postgres-tests` feature. Tests skip when the variable is absent.

#[path = "support/skip.rs"]
mod skip;

use std::sync::Arc;

use color_eyre::eyre::Result;
use pg_context_conn::{
    ConfigName, ConnectionContext, ConnectionError, ConnectionManager, DatabaseTargets,
    PgConnectionFactory,
};
use postgres::{Client, NoTls};
use skip::live_url_or_skip;

const URL_ENV: &str = "PG_CONN_TEST_URL";

fn live_manager(url: &str) -> Result<ConnectionManager<PgConnectionFactory>> {
    let name = ConfigName::new("live")?;
    let targets = DatabaseTargets::new().with_target(name.clone(), url);
    Ok(ConnectionManager::new(
        name,
        Arc::new(PgConnectionFactory::new(targets)),
    )?)
}

#[test]
fn release_commits_work_and_keeps_the_session() {
    let Some(url) = live_url_or_skip(URL_ENV) else {
        return;
    };
    let mut manager = live_manager(&url).expect("manager");
    let mut ctx = ConnectionContext::new();

    let pid: i32 = {
        let client = manager
            .acquire(&mut ctx)
            .expect("acquire")
            .client()
            .expect("begin");
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS pg_context_conn_commit (note text); \
                 INSERT INTO pg_context_conn_commit VALUES ('committed')",
            )
            .expect("insert");
        client
            .query_one("SELECT pg_backend_pid()", &[])
            .expect("pid")
            .get(0)
    };

    manager.release(&mut ctx).expect("release");

    let mut observer = Client::connect(&url, NoTls).expect("observer connects");
    let count: i64 = observer
        .query_one(
            "SELECT count(*) FROM pg_context_conn_commit WHERE note = 'committed'",
            &[],
        )
        .expect("count")
        .get(0);
    assert!(count >= 1, "release must commit pending work");

    let same_pid: i32 = manager
        .acquire(&mut ctx)
        .expect("reacquire")
        .client()
        .expect("begin")
        .query_one("SELECT pg_backend_pid()", &[])
        .expect("pid")
        .get(0);
    assert_eq!(pid, same_pid, "release keeps the backend session");

    manager.final_release(&mut ctx).expect("final release");
    assert!(ctx.registry().is_empty());
    observer
        .batch_execute("DROP TABLE IF EXISTS pg_context_conn_commit")
        .expect("cleanup");
}

#[test]
fn release_reports_a_transaction_aborted_by_a_failed_statement() {
    let Some(url) = live_url_or_skip(URL_ENV) else {
        return;
    };
    let mut observer = Client::connect(&url, NoTls).expect("observer connects");
    observer
        .batch_execute(
            "DROP TABLE IF EXISTS pg_context_conn_aborted; \
             CREATE TABLE pg_context_conn_aborted (id int)",
        )
        .expect("setup");
    let mut manager = live_manager(&url).expect("manager");
    let mut ctx = ConnectionContext::new();

    {
        let client = manager
            .acquire(&mut ctx)
            .expect("acquire")
            .client()
            .expect("begin");
        client
            .batch_execute("INSERT INTO pg_context_conn_aborted VALUES (1)")
            .expect("insert");
        assert!(
            client
                .batch_execute("SELECT * FROM pg_context_conn_missing_table")
                .is_err(),
            "statement against a missing table must fail"
        );
    }

    let err = manager
        .release(&mut ctx)
        .expect_err("aborted work must not be reported as committed");
    assert!(
        matches!(err, ConnectionError::Commit(_)),
        "unexpected error: {err:?}"
    );
    let rows: i64 = observer
        .query_one("SELECT count(*) FROM pg_context_conn_aborted", &[])
        .expect("count")
        .get(0);
    assert_eq!(rows, 0);

    let conn = manager.acquire(&mut ctx).expect("session is still usable");
    assert!(!conn.in_transaction(), "aborted work was rolled back");
    conn.client()
        .expect("begin")
        .batch_execute("INSERT INTO pg_context_conn_aborted VALUES (2)")
        .expect("insert after rollback");
    manager.final_release(&mut ctx).expect("final release");

    let rows_after: i64 = observer
        .query_one("SELECT count(*) FROM pg_context_conn_aborted", &[])
        .expect("count")
        .get(0);
    assert_eq!(rows_after, 1);
    observer
        .batch_execute("DROP TABLE IF EXISTS pg_context_conn_aborted")
        .expect("cleanup");
}

#[test]
fn terminated_backend_is_replaced() {
    let Some(url) = live_url_or_skip(URL_ENV) else {
        return;
    };
    let mut manager = live_manager(&url).expect("manager");
    let mut ctx = ConnectionContext::new();

    let pid: i32 = manager
        .acquire(&mut ctx)
        .expect("acquire")
        .client()
        .expect("begin")
        .query_one("SELECT pg_backend_pid()", &[])
        .expect("pid")
        .get(0);
    manager.release(&mut ctx).expect("release");

    let mut admin = Client::connect(&url, NoTls).expect("admin connects");
    admin
        .execute("SELECT pg_terminate_backend($1)", &[&pid])
        .expect("terminate");

    let new_pid: i32 = manager
        .acquire(&mut ctx)
        .expect("reacquire after termination")
        .client()
        .expect("begin")
        .query_one("SELECT pg_backend_pid()", &[])
        .expect("pid")
        .get(0);
    assert_ne!(pid, new_pid);
    manager.final_release(&mut ctx).expect("final release");
}
