use chrono::{Duration, TimeZone, Utc};
use loyalty_core::{
    LedgerError, LedgerStore, Product, Transaction, TransactionFilter, TransactionKind,
    TransactionStatus, Venue,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ── Test helpers ────────────────────────────────────────────────────────────

fn store_with_venues() -> LedgerStore {
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    let ledger = store.reader();
    ledger.insert_venue(&Venue::new("a", "Schlachthof")).unwrap();
    ledger
        .insert_venue(&Venue::new("b", "Park Café").with_margins(None, Some(dec!(65)), None))
        .unwrap();
    store
}

fn completed(kind: TransactionKind, user_id: &str, venue_id: &str, minute: i64) -> Transaction {
    let at = Utc.with_ymd_and_hms(2024, 1, 10, 19, 0, 0).unwrap() + Duration::minutes(minute);
    let mut txn = Transaction::pending(kind, user_id, venue_id, "test", at);
    txn.transition(TransactionStatus::Completed, at).unwrap();
    txn
}

// ── Balances ─────────────────────────────────────────────────────────────────

#[test]
fn earn_and_spend_keep_balance_consistent() {
    let store = store_with_venues();
    let ledger = store.reader();

    ledger.earn("alice", "a", dec!(12.34)).unwrap();
    let b = ledger.spend("alice", "a", dec!(2.34)).unwrap();

    assert_eq!(b.points_earned, dec!(12.34));
    assert_eq!(b.points_spent, dec!(2.34));
    assert_eq!(b.points_available, dec!(10));
    assert!(b.is_consistent());
}

#[test]
fn spend_beyond_available_is_refused() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger.earn("alice", "a", dec!(5)).unwrap();

    let err = ledger.spend("alice", "a", dec!(5.01)).unwrap_err();
    match err {
        LedgerError::InsufficientPoints { available, required } => {
            assert_eq!(available, dec!(5));
            assert_eq!(required, dec!(5.01));
        }
        other => panic!("expected InsufficientPoints, got {other:?}"),
    }
    assert_eq!(ledger.balance("alice", "a").unwrap().unwrap().points_available, dec!(5));
}

#[test]
fn balances_are_isolated_per_venue() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger.earn("alice", "a", dec!(40)).unwrap();
    ledger.earn("alice", "b", dec!(10)).unwrap();
    ledger.spend("alice", "b", dec!(10)).unwrap();

    let all = ledger.balances_for_user("alice").unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].venue_id, "a");
    assert_eq!(all[0].points_available, dec!(40));
    assert_eq!(all[1].points_available, Decimal::ZERO);
}

#[test]
fn ensure_balance_is_idempotent() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger.ensure_balance("alice", "a").unwrap();
    ledger.earn("alice", "a", dec!(3)).unwrap();
    let b = ledger.ensure_balance("alice", "a").unwrap();
    assert_eq!(b.points_available, dec!(3));
    assert_eq!(ledger.all_balances().unwrap().len(), 1);
}

#[test]
fn reverse_earn_cannot_overdraw() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger.earn("alice", "a", dec!(10)).unwrap();
    ledger.spend("alice", "a", dec!(8)).unwrap();

    let err = ledger.reverse_earn("alice", "a", dec!(10)).unwrap_err();
    assert!(matches!(err, LedgerError::ReversalExceedsBalance { .. }));

    let b = ledger.reverse_spend("alice", "a", dec!(8)).unwrap();
    assert_eq!(b.points_available, dec!(10));
    let b = ledger.reverse_earn("alice", "a", dec!(10)).unwrap();
    assert_eq!(b.points_earned, Decimal::ZERO);
    assert!(b.is_consistent());
}

#[test]
fn negative_points_are_rejected() {
    let store = store_with_venues();
    let err = store.reader().earn("alice", "a", dec!(-1)).unwrap_err();
    assert!(matches!(err, LedgerError::NegativeAmount { .. }));
}

// ── Units of work ────────────────────────────────────────────────────────────

#[test]
fn failed_unit_of_work_rolls_back() {
    let mut store = store_with_venues();

    let result: Result<(), LedgerError> = store.atomically(|ledger| {
        ledger.earn("alice", "a", dec!(50))?;
        ledger.spend("alice", "a", dec!(80))?;
        Ok(())
    });

    assert!(result.is_err());
    assert!(store.reader().balance("alice", "a").unwrap().is_none());
}

#[test]
fn committed_unit_of_work_persists() {
    let mut store = store_with_venues();
    store
        .atomically(|ledger| {
            ledger.earn("alice", "a", dec!(50))?;
            ledger.spend("alice", "a", dec!(20))
        })
        .unwrap();
    assert_eq!(
        store.reader().balance("alice", "a").unwrap().unwrap().points_available,
        dec!(30)
    );
}

// ── Venues and products ──────────────────────────────────────────────────────

#[test]
fn unset_margins_survive_storage() {
    let store = store_with_venues();
    let b = store.reader().require_venue("b").unwrap();
    assert_eq!(b.food_margin, None);
    assert_eq!(b.beverage_margin, Some(dec!(65)));
    assert_eq!(b.default_margin, None);
    assert_eq!(b.points_multiplier, Decimal::ONE);
}

#[test]
fn product_lookup_is_scoped_to_venue() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger
        .insert_product(&Product::new("pils", "a", "Pils", "beverages", dec!(4.5)))
        .unwrap();

    assert_eq!(ledger.product_at_venue("a", "pils").unwrap().price, dec!(4.50));
    assert!(matches!(
        ledger.product_at_venue("b", "pils"),
        Err(LedgerError::ProductNotFound { .. })
    ));
    assert_eq!(ledger.products_for_venue("a").unwrap().len(), 1);
}

// ── Referral chains ──────────────────────────────────────────────────────────

#[test]
fn registered_chain_shifts_referrer_chain() {
    let store = store_with_venues();
    let ledger = store.reader();
    let now = Utc::now();
    for (user, referrer) in [("u1", "u0"), ("u2", "u1"), ("u3", "u2"), ("u4", "u3"), ("u5", "u4"), ("u6", "u5")] {
        ledger.register_referral(user, referrer, now).unwrap();
    }

    let chain = ledger.referral_chain("u6").unwrap().unwrap();
    let ids: Vec<_> = chain.levels().map(|(_, id)| id.as_str()).collect();
    assert_eq!(ids, ["u5", "u4", "u3", "u2", "u1"]);
}

#[test]
fn chain_is_written_once() {
    let store = store_with_venues();
    let ledger = store.reader();
    ledger.register_referral("u1", "u0", Utc::now()).unwrap();

    let err = ledger.register_referral("u1", "u9", Utc::now()).unwrap_err();
    assert!(matches!(err, LedgerError::ReferralChainExists { .. }));

    let chain = ledger.referral_chain("u1").unwrap().unwrap();
    assert!(matches!(
        ledger.insert_referral_chain(&chain),
        Err(LedgerError::Database(_))
    ));
}

#[test]
fn self_referral_is_rejected() {
    let store = store_with_venues();
    let err = store.reader().register_referral("u1", "u1", Utc::now()).unwrap_err();
    assert!(matches!(err, LedgerError::SelfReferral { .. }));
}

// ── Transactions ─────────────────────────────────────────────────────────────

#[test]
fn history_is_newest_first_with_filters_and_paging() {
    let store = store_with_venues();
    let ledger = store.reader();
    let txns = [
        completed(TransactionKind::Purchase, "alice", "a", 0),
        completed(TransactionKind::Purchase, "alice", "b", 1),
        completed(TransactionKind::AdminAdjustment, "alice", "a", 2),
        completed(TransactionKind::Purchase, "alice", "a", 3),
        completed(TransactionKind::Purchase, "bob", "a", 4),
    ];
    for t in &txns {
        ledger.insert_transaction(t).unwrap();
    }

    let (all, total) = ledger
        .transactions_for_user("alice", &TransactionFilter::default())
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(all[0].transaction_id, txns[3].transaction_id);
    assert_eq!(all[3].transaction_id, txns[0].transaction_id);

    let (at_a, total) = ledger
        .transactions_for_user(
            "alice",
            &TransactionFilter::default().at_venue("a").of_kind(TransactionKind::Purchase),
        )
        .unwrap();
    assert_eq!(total, 2);
    assert!(at_a.iter().all(|t| t.venue_id == "a" && t.kind == TransactionKind::Purchase));

    let (page, total) = ledger
        .transactions_for_user("alice", &TransactionFilter::default().page(2, 1))
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].transaction_id, txns[2].transaction_id);
}

#[test]
fn status_update_persists_lifecycle_stamps() {
    let store = store_with_venues();
    let ledger = store.reader();
    let mut txn = completed(TransactionKind::Purchase, "alice", "a", 0);
    ledger.insert_transaction(&txn).unwrap();

    let later = txn.created_at + Duration::days(1);
    txn.transition(TransactionStatus::Refunded, later).unwrap();
    ledger.update_transaction_status(&txn).unwrap();

    let stored = ledger.require_transaction(&txn.transaction_id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Refunded);
    assert_eq!(stored.refunded_at, Some(later));
}

#[test]
fn idempotency_key_is_unique_per_user() {
    let store = store_with_venues();
    let ledger = store.reader();
    let mut first = completed(TransactionKind::Purchase, "alice", "a", 0);
    first.idempotency_key = Some("k1".into());
    ledger.insert_transaction(&first).unwrap();

    let mut dup = completed(TransactionKind::Purchase, "alice", "a", 1);
    dup.idempotency_key = Some("k1".into());
    assert!(ledger.insert_transaction(&dup).is_err());

    let found = ledger.find_by_idempotency_key("alice", "k1").unwrap().unwrap();
    assert_eq!(found.transaction_id, first.transaction_id);
    assert!(ledger.find_by_idempotency_key("bob", "k1").unwrap().is_none());
}
