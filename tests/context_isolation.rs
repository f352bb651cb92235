//! Verifies that distinct execution contexts never share cached connections.

use std::sync::{Arc, Barrier};
use std::thread;

use pg_context_conn::test_support::FakeFactory;
use pg_context_conn::{ConfigName, ConnectionContext, ConnectionManager};
use rstest::rstest;

#[expect(clippy::expect_used, reason = "setup failures abort the test")]
fn db1_manager(factory: &Arc<FakeFactory>) -> ConnectionManager<FakeFactory> {
    ConnectionManager::new(
        ConfigName::new("db1").expect("valid name"),
        Arc::clone(factory),
    )
    .expect("db1 is recognised")
}

#[test]
fn contexts_on_one_thread_are_independent() {
    let factory = Arc::new(FakeFactory::new());
    let mut manager = db1_manager(&factory);
    let mut first = ConnectionContext::new();
    let mut second = ConnectionContext::new();

    let a = manager.acquire(&mut first).expect("first").serial();
    let b = manager.acquire(&mut second).expect("second").serial();
    assert_ne!(a, b);

    manager
        .final_release(&mut first)
        .expect("final release first");
    assert!(first.registry().is_empty());
    assert_eq!(second.registry().len(), 1);
    assert_eq!(manager.acquire(&mut second).expect("reuse").serial(), b);
    manager
        .final_release(&mut second)
        .expect("final release second");
}

#[rstest]
#[case(2)]
#[case(4)]
fn concurrent_threads_receive_independent_handles(#[case] threads: usize) {
    let factory = Arc::new(FakeFactory::new());
    let barrier = Arc::new(Barrier::new(threads));

    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let worker_factory = Arc::clone(&factory);
            let worker_barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut manager = db1_manager(&worker_factory);
                let mut ctx = ConnectionContext::new();

                let first = manager.acquire(&mut ctx).expect("acquire").serial();
                worker_barrier.wait();
                for _ in 0..10 {
                    manager.release(&mut ctx).expect("release");
                    let again = manager.acquire(&mut ctx).expect("reacquire").serial();
                    assert_eq!(again, first, "context must keep its own handle");
                }
                worker_barrier.wait();
                manager.final_release(&mut ctx).expect("final release");
                assert!(ctx.registry().is_empty());
                first
            })
        })
        .collect();

    let mut serials: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker should not panic"))
        .collect();
    serials.sort_unstable();
    serials.dedup();

    assert_eq!(serials.len(), threads, "every context got its own handle");
    assert_eq!(factory.create_count(), threads);
    for state in factory.created() {
        assert_eq!(state.commits(), 11);
        assert_eq!(state.close_calls(), 1);
    }
}

#[test]
fn invalidation_in_one_context_does_not_disturb_another() {
    let factory = Arc::new(FakeFactory::new());
    let barrier = Arc::new(Barrier::new(2));

    let spawn_worker = |invalidate: bool| {
        let worker_factory = Arc::clone(&factory);
        let worker_barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut manager = db1_manager(&worker_factory);
            let mut ctx = ConnectionContext::new();
            let original = manager.acquire(&mut ctx).expect("acquire").serial();
            worker_barrier.wait();
            if invalidate {
                worker_factory
                    .created()
                    .iter()
                    .find(|state| state.serial() == original)
                    .expect("own connection is recorded")
                    .set_alive(false);
            }
            worker_barrier.wait();
            let current = manager.acquire(&mut ctx).expect("reacquire").serial();
            manager.final_release(&mut ctx).expect("final release");
            (original, current)
        })
    };

    let invalidating = spawn_worker(true);
    let steady = spawn_worker(false);
    let (c1_before, c1_after) = invalidating.join().expect("c1 should not panic");
    let (c2_before, c2_after) = steady.join().expect("c2 should not panic");

    assert_ne!(c1_before, c1_after, "c1 reconnected after invalidation");
    assert_eq!(c2_before, c2_after, "c2 kept its handle");
    assert_eq!(factory.create_count(), 3);
}
