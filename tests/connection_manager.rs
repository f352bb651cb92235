//! Behavioural checks for the acquire / release / final-release lifecycle of
//! a single execution context.

use std::sync::Arc;

use color_eyre::eyre::{Result, ensure, eyre};
use pg_context_conn::test_support::FakeFactory;
use pg_context_conn::{
    ConfigError, ConfigName, ConnectionContext, ConnectionError, ConnectionManager,
};
use rstest::{fixture, rstest};

struct Harness {
    factory: Arc<FakeFactory>,
    manager: ConnectionManager<FakeFactory>,
}

#[expect(clippy::expect_used, reason = "fixture setup failures abort the test")]
#[fixture]
fn harness() -> Harness {
    let factory = Arc::new(FakeFactory::new());
    let manager = ConnectionManager::new(
        ConfigName::new("db1").expect("valid name"),
        Arc::clone(&factory),
    )
    .expect("db1 is recognised");
    Harness { factory, manager }
}

#[rstest]
fn lifecycle_walkthrough(harness: Harness) -> Result<()> {
    let Harness {
        factory,
        mut manager,
    } = harness;
    let mut ctx = ConnectionContext::new();

    // Acquiring twice opens a single connection.
    let h1 = manager.acquire(&mut ctx)?.serial();
    ensure!(factory.create_count() == 1, "first acquire opens one");
    ensure!(
        manager.acquire(&mut ctx)?.serial() == h1,
        "second acquire reuses the cached connection"
    );
    ensure!(factory.create_count() == 1, "reuse opens nothing");

    // Release commits on the cached handle and keeps it.
    manager.release(&mut ctx)?;
    let h1_state = factory.created_at(0)?;
    ensure!(h1_state.commits() == 1, "release commits once");
    ensure!(
        manager.acquire(&mut ctx)?.serial() == h1,
        "release keeps the connection cached"
    );
    ensure!(factory.create_count() == 1, "release opens nothing");

    // An invalid handle is replaced without being closed.
    h1_state.set_alive(false);
    let h2 = manager.acquire(&mut ctx)?.serial();
    ensure!(h2 != h1, "invalid connection must be replaced");
    ensure!(factory.create_count() == 2, "replacement opens one");
    ensure!(
        h1_state.close_calls() == 0,
        "stale connection is abandoned without close"
    );

    // Final release commits, evicts and closes the current handle.
    manager.final_release(&mut ctx)?;
    let h2_state = factory.created_at(1)?;
    ensure!(h2_state.commits() == 1, "final release commits once");
    ensure!(h2_state.is_closed(), "final release closes the connection");
    ensure!(ctx.registry().is_empty(), "final release evicts the entry");

    // The next acquisition starts a new cycle.
    let h3 = manager.acquire(&mut ctx)?.serial();
    ensure!(h3 != h2, "new cycle, new handle");
    ensure!(factory.create_count() == 3, "three connections opened");

    manager.final_release(&mut ctx)?;
    Ok(())
}

#[rstest]
#[case(1)]
#[case(5)]
#[case(25)]
fn repeated_units_of_work_reuse_one_connection(
    harness: Harness,
    #[case] units: usize,
) -> Result<()> {
    let Harness {
        factory,
        mut manager,
    } = harness;
    let mut ctx = ConnectionContext::new();

    for _ in 0..units {
        manager.acquire(&mut ctx)?;
        manager.release(&mut ctx)?;
    }
    manager.final_release(&mut ctx)?;

    ensure!(factory.create_count() == 1, "one connection serves all");
    let state = factory.created_at(0)?;
    ensure!(
        state.commits() == units + 1,
        "expected {} commits, saw {}",
        units + 1,
        state.commits()
    );
    ensure!(state.close_calls() == 1, "connection closed exactly once");
    Ok(())
}

#[rstest]
fn peer_closed_connection_is_reopened(harness: Harness) -> Result<()> {
    let Harness {
        factory,
        mut manager,
    } = harness;
    let mut ctx = ConnectionContext::new();

    manager.acquire(&mut ctx)?;
    factory.created_at(0)?.mark_closed();
    manager.release(&mut ctx)?;

    ensure!(factory.create_count() == 2, "closed connection is replaced");
    ensure!(
        factory.created_at(1)?.commits() == 1,
        "release commits on the replacement"
    );
    manager.final_release(&mut ctx)?;
    Ok(())
}

fn rejected_unit_of_work(
    manager: &mut ConnectionManager<FakeFactory>,
) -> pg_context_conn::Result<()> {
    let mut ctx = ConnectionContext::new();
    manager.acquire(&mut ctx)?;
    manager.release(&mut ctx)?;
    manager.acquire(&mut ctx)?;
    Err(ConfigError::from(eyre!("unit of work rejected")).into())
}

#[rstest]
fn early_return_discards_uncommitted_work(harness: Harness) -> Result<()> {
    let Harness {
        factory,
        mut manager,
    } = harness;

    let outcome = rejected_unit_of_work(&mut manager);

    ensure!(
        matches!(outcome, Err(ConnectionError::Config(_))),
        "unexpected outcome: {outcome:?}"
    );
    let state = factory.created_at(0)?;
    ensure!(state.commits() == 1, "only the explicit release commits");
    ensure!(state.is_closed(), "dropped context closes the connection");
    Ok(())
}
