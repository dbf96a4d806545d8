//! ---
//! ctk_section: "07-testing-qa"
//! ctk_subsection: "integration-tests"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Two stores over one backing directory converging via the signal hub."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use ctk_session::{AnonSession, DemoFlag, DEMO_KEY};
use ctk_storage::{DebouncedSync, DefensiveStore, FileStore, SignalHub};

const WINDOW: Duration = Duration::from_millis(25);

// One "tab": its own store handle over the shared backing directory,
// wired to the shared hub.
fn tab(dir: &Path, hub: &SignalHub) -> DefensiveStore {
    DefensiveStore::with_hub(Arc::new(FileStore::open(dir).unwrap()), hub.clone())
}

#[tokio::test]
async fn demo_activation_converges_to_other_tab() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SignalHub::new();
    let ttl = Duration::from_secs(7200);

    let flag_a = DemoFlag::new(tab(dir.path(), &hub), ttl);
    let flag_b = DemoFlag::new(tab(dir.path(), &hub), ttl);

    let resyncs = Arc::new(AtomicUsize::new(0));
    let counter = resyncs.clone();
    let _sync = flag_b
        .subscribe_sync(WINDOW, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("store has a hub");

    let now = 1_700_000_000_000;
    assert!(!flag_b.is_live(now));
    assert!(flag_a.activate(now));

    sleep(WINDOW * 4).await;
    assert_eq!(resyncs.load(Ordering::SeqCst), 1);
    assert!(flag_b.is_live(now + 1_000));
}

#[tokio::test]
async fn mutation_bursts_coalesce_into_one_resync() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SignalHub::new();
    let store = tab(dir.path(), &hub);

    let resyncs = Arc::new(AtomicUsize::new(0));
    let counter = resyncs.clone();
    let _sync = DebouncedSync::spawn(&hub, DEMO_KEY, WINDOW, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..5 {
        store.set(DEMO_KEY, &format!("{{\"t\":{i}}}"));
    }
    sleep(WINDOW * 4).await;
    assert_eq!(resyncs.load(Ordering::SeqCst), 1);

    // An unrelated key never wakes this subscription.
    store.set("ctk.other", "x");
    sleep(WINDOW * 4).await;
    assert_eq!(resyncs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn visibility_restore_forces_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SignalHub::new();
    let _store = tab(dir.path(), &hub);

    let resyncs = Arc::new(AtomicUsize::new(0));
    let counter = resyncs.clone();
    let _sync = DebouncedSync::spawn(&hub, DEMO_KEY, WINDOW, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Visibility restoration matches every subscription regardless of key.
    hub.notify_visible();
    sleep(WINDOW * 4).await;
    assert_eq!(resyncs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_minted_in_one_tab_is_reused_by_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SignalHub::new();
    let ttl = Duration::from_secs(604_800);

    let session_a = AnonSession::new(tab(dir.path(), &hub), ttl);
    let session_b = AnonSession::new(tab(dir.path(), &hub), ttl);

    let now = 1_700_000_000_000;
    let token = session_a.ensure(now);
    assert!(token.starts_with("u_"));

    // Same backing storage, still live: no second mint.
    assert_eq!(session_b.ensure(now + 1_000), token);
}
