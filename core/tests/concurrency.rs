use loyalty_core::{
    AuthenticatedUser, ErrorKind, LedgerConfig, LedgerStore, PurchaseRequest,
    TransactionProcessor, Venue,
};
use rust_decimal_macros::dec;
use std::{path::PathBuf, thread};

// ── Test helpers ────────────────────────────────────────────────────────────

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!("loyalty-ledger-{}.db", uuid::Uuid::new_v4()))
}

fn remove_db(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Four connections race to spend the same 100 points in chunks of 5.
/// Exactly 20 spends can succeed and the balance row never goes negative.
#[test]
fn concurrent_spends_never_overdraw() {
    let path = temp_db();
    let db = path.display().to_string();

    let mut store = LedgerStore::open(&db).unwrap();
    store.migrate().unwrap();
    store
        .reader()
        .insert_venue(&Venue::new("v1", "Schlachthof"))
        .unwrap();
    TransactionProcessor::with_system_clock(LedgerConfig::default())
        .adjust_points(&mut store, "alice", "v1", dec!(100), "welcome")
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            thread::spawn(move || {
                let config = LedgerConfig::default();
                let mut store = LedgerStore::open(&db).unwrap();
                store.set_busy_timeout(config.busy_timeout_ms).unwrap();
                let processor = TransactionProcessor::with_system_clock(config);
                let user = AuthenticatedUser::new("alice");

                let mut settled = 0u32;
                for _ in 0..10 {
                    // €0.01 cash earns 0.00, so only the welcome points are spendable.
                    let request = PurchaseRequest::split("v1", dec!(0.01), dec!(5));
                    match processor.create_transaction(&mut store, &user, &request) {
                        Ok(_) => settled += 1,
                        Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidArgument, "{e}"),
                    }
                }
                settled
            })
        })
        .collect();

    let settled: u32 = workers.into_iter().map(|w| w.join().unwrap()).sum();

    let b = store.reader().balance("alice", "v1").unwrap().unwrap();
    assert_eq!(settled, 20);
    assert_eq!(b.points_available, dec!(0));
    assert_eq!(b.points_spent, dec!(100));
    assert!(b.is_consistent());

    drop(store);
    remove_db(&path);
}
