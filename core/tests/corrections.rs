use chrono::{Duration, TimeZone, Utc};
use loyalty_core::{
    product::ProductUpdate, venue::VenueUpdate, AuthenticatedUser, Clock, ErrorKind, LedgerConfig,
    LedgerError, LedgerStore, LineItem, ManualClock, Product, PurchaseRequest, TransactionKind,
    TransactionProcessor, TransactionStatus, Venue,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

// ── Test helpers ────────────────────────────────────────────────────────────

fn setup() -> (LedgerStore, TransactionProcessor, Arc<ManualClock>) {
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    // Every margin 80: cash earns exactly the base rate.
    let flat = Venue::new("flat", "Kulturpalast").with_margins(Some(dec!(80)), Some(dec!(80)), Some(dec!(80)));
    store.reader().insert_venue(&flat).unwrap();

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 4, 5, 22, 0, 0).unwrap()));
    let processor = TransactionProcessor::new(LedgerConfig::default(), clock.clone());
    (store, processor, clock)
}

fn buy(store: &mut LedgerStore, p: &TransactionProcessor, user_id: &str, request: PurchaseRequest) -> String {
    p.create_transaction(store, &AuthenticatedUser::new(user_id), &request)
        .unwrap()
        .transaction
        .transaction_id
}

fn available(store: &LedgerStore, user_id: &str) -> Decimal {
    store
        .reader()
        .balance(user_id, "flat")
        .unwrap()
        .map_or(Decimal::ZERO, |b| b.points_available)
}

// ── Refunds ──────────────────────────────────────────────────────────────────

#[test]
fn refund_reverses_purchaser_referrers_and_aggregates() {
    let (mut store, p, _) = setup();
    p.register_referral(&mut store, "buyer", "r1").unwrap();
    let txn_id = buy(&mut store, &p, "buyer", PurchaseRequest::cash("flat", dec!(1000)));
    assert_eq!(available(&store, "r1"), dec!(25));

    let r = p.refund_transaction(&mut store, &txn_id, "Order returned").unwrap();

    assert_eq!(r.original.status, TransactionStatus::Refunded);
    assert!(r.original.refunded_at.is_some());
    assert_eq!(r.refund.kind, TransactionKind::Refund);
    assert_eq!(r.refund.original_transaction_id.as_deref(), Some(txn_id.as_str()));
    assert_eq!(r.reversed_bonuses.len(), 1);
    assert_eq!(r.reversed_bonuses[0].status, TransactionStatus::Refunded);

    let buyer = store.reader().balance("buyer", "flat").unwrap().unwrap();
    assert_eq!(buyer.points_available, Decimal::ZERO);
    assert_eq!(buyer.points_earned, Decimal::ZERO);
    assert_eq!(available(&store, "r1"), Decimal::ZERO);

    let stored = store.reader().require_transaction(&txn_id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Refunded);

    let venue = store.reader().require_venue("flat").unwrap();
    assert_eq!(venue.total_revenue, Decimal::ZERO);
    assert_eq!(venue.total_points_issued, Decimal::ZERO);

    let chain = store.reader().referral_chain("buyer").unwrap().unwrap();
    assert_eq!(chain.level_earnings[0], Decimal::ZERO);
    assert_eq!(store.reader().event_count("purchase_refunded").unwrap(), 1);
}

#[test]
fn refund_restores_points_spent() {
    let (mut store, p, _) = setup();
    p.adjust_points(&mut store, "alice", "flat", dec!(20), "welcome").unwrap();
    let txn_id = buy(&mut store, &p, "alice", PurchaseRequest::split("flat", dec!(80), dec!(20)));
    assert_eq!(available(&store, "alice"), dec!(8));

    p.refund_transaction(&mut store, &txn_id, "Wrong table").unwrap();

    let b = store.reader().balance("alice", "flat").unwrap().unwrap();
    assert_eq!(b.points_available, dec!(20));
    assert_eq!(b.points_spent, Decimal::ZERO);
    assert!(b.is_consistent());
}

#[test]
fn refund_keeps_streak_state() {
    let (mut store, p, _) = setup();
    let txn_id = buy(&mut store, &p, "alice", PurchaseRequest::cash("flat", dec!(10)));
    p.refund_transaction(&mut store, &txn_id, "Order returned").unwrap();

    let b = store.reader().balance("alice", "flat").unwrap().unwrap();
    assert_eq!(b.total_visits, 1);
    assert_eq!(b.current_streak, 1);
}

#[test]
fn second_refund_is_invalid_state() {
    let (mut store, p, _) = setup();
    let txn_id = buy(&mut store, &p, "alice", PurchaseRequest::cash("flat", dec!(10)));
    p.refund_transaction(&mut store, &txn_id, "Order returned").unwrap();

    let err = p.refund_transaction(&mut store, &txn_id, "again").unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn only_purchases_are_refundable() {
    let (mut store, p, _) = setup();
    let adj = p.adjust_points(&mut store, "alice", "flat", dec!(5), "goodwill").unwrap();

    let err = p
        .refund_transaction(&mut store, &adj.transaction_id, "nope")
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotRefundable { .. }));
}

#[test]
fn unknown_transaction_is_not_found() {
    let (mut store, p, _) = setup();
    let err = p.refund_transaction(&mut store, "missing", "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Once the earned points are gone, the refund is refused outright.
#[test]
fn refund_that_would_overdraw_changes_nothing() {
    let (mut store, p, _) = setup();
    p.register_referral(&mut store, "buyer", "r1").unwrap();
    let first = buy(&mut store, &p, "buyer", PurchaseRequest::cash("flat", dec!(1000)));
    // Spend 90 of the 100 earned; this purchase earns 1 more.
    buy(&mut store, &p, "buyer", PurchaseRequest::split("flat", dec!(10), dec!(90)));
    assert_eq!(available(&store, "buyer"), dec!(11));

    let err = p.refund_transaction(&mut store, &first, "late return").unwrap_err();

    assert!(matches!(err, LedgerError::ReversalExceedsBalance { .. }));
    assert_eq!(available(&store, "buyer"), dec!(11));
    assert_eq!(available(&store, "r1"), dec!(25.25));
    let stored = store.reader().require_transaction(&first).unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(store.reader().transaction_count(TransactionKind::Refund).unwrap(), 0);
}

// ── Adjustments ──────────────────────────────────────────────────────────────

#[test]
fn adjustments_credit_and_debit() {
    let (mut store, p, _) = setup();
    let credit = p.adjust_points(&mut store, "alice", "flat", dec!(15), "event host").unwrap();
    let debit = p.adjust_points(&mut store, "alice", "flat", dec!(-5), "correction").unwrap();

    assert_eq!(credit.points_earned, dec!(15));
    assert_eq!(debit.points_spent, dec!(5));
    assert_eq!(debit.status, TransactionStatus::Completed);

    let b = store.reader().balance("alice", "flat").unwrap().unwrap();
    assert_eq!(b.points_available, dec!(10));
    assert_eq!(b.points_spent, dec!(5));
    assert_eq!(store.reader().transaction_count(TransactionKind::AdminAdjustment).unwrap(), 2);
}

#[test]
fn adjustment_cannot_overdraw() {
    let (mut store, p, _) = setup();
    p.adjust_points(&mut store, "alice", "flat", dec!(10), "welcome").unwrap();

    let err = p.adjust_points(&mut store, "alice", "flat", dec!(-50), "oops").unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientPoints { .. }));
    assert_eq!(available(&store, "alice"), dec!(10));
}

#[test]
fn zero_adjustment_is_rejected() {
    let (mut store, p, _) = setup();
    let err = p.adjust_points(&mut store, "alice", "flat", Decimal::ZERO, "noop").unwrap_err();
    assert!(matches!(err, LedgerError::ZeroAdjustment));
}

// ── Owner configuration ──────────────────────────────────────────────────────

#[test]
fn invalid_venue_update_leaves_venue_untouched() {
    let (mut store, p, _) = setup();
    let update = VenueUpdate {
        food_margin: Some(dec!(120)),
        name: Some("Renamed".into()),
        ..Default::default()
    };

    let err = p.update_venue(&mut store, "flat", &update).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(store.reader().require_venue("flat").unwrap().name, "Kulturpalast");
}

#[test]
fn venue_multiplier_scales_new_purchases() {
    let (mut store, p, _) = setup();
    let update = VenueUpdate {
        points_multiplier: Some(dec!(2)),
        ..Default::default()
    };
    p.update_venue(&mut store, "flat", &update).unwrap();

    buy(&mut store, &p, "alice", PurchaseRequest::cash("flat", dec!(100)));
    assert_eq!(available(&store, "alice"), dec!(20));
}

#[test]
fn product_bonus_window_and_deactivation() {
    let (mut store, p, clock) = setup();
    store
        .reader()
        .insert_product(&Product::new("spritz", "flat", "Aperol Spritz", "drinks", dec!(100)))
        .unwrap();
    let spritz = || LineItem {
        product_id: Some("spritz".into()),
        name: "Aperol Spritz".into(),
        quantity: 1,
        price: dec!(100),
        category: None,
    };
    let order = || PurchaseRequest::cash("flat", dec!(100)).with_items(vec![spritz()]);

    let end = clock.now() + Duration::days(1);
    p.activate_product_bonus(&mut store, "flat", "spritz", dec!(3), None, Some(end), None)
        .unwrap();
    let during = p
        .create_transaction(&mut store, &AuthenticatedUser::new("alice"), &order())
        .unwrap();
    assert_eq!(during.transaction.points_earned, dec!(30));

    clock.advance_days(2);
    let after = p
        .create_transaction(&mut store, &AuthenticatedUser::new("alice"), &order())
        .unwrap();
    assert_eq!(after.transaction.points_earned, dec!(10));

    p.activate_product_bonus(&mut store, "flat", "spritz", dec!(1.5), None, None, None)
        .unwrap();
    let stopped = p.deactivate_product_bonus(&mut store, "flat", "spritz").unwrap();
    assert!(!stopped.bonus.active);
    let plain = p
        .create_transaction(&mut store, &AuthenticatedUser::new("alice"), &order())
        .unwrap();
    assert_eq!(plain.transaction.points_earned, dec!(10));
}

#[test]
fn bonus_multiplier_out_of_range_is_rejected() {
    let (mut store, p, _) = setup();
    store
        .reader()
        .insert_product(&Product::new("beer", "flat", "Pils", "beverages", dec!(4.5)))
        .unwrap();

    for bad in [dec!(1), dec!(0.5), dec!(10.5)] {
        let err = p
            .activate_product_bonus(&mut store, "flat", "beer", bad, None, None, None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBonus { .. }), "{bad} accepted");
    }
}

#[test]
fn product_update_changes_category() {
    let (mut store, p, _) = setup();
    store
        .reader()
        .insert_product(&Product::new("fries", "flat", "Fries", "snacks", dec!(4)))
        .unwrap();
    let update = ProductUpdate {
        category: Some("food".into()),
        ..Default::default()
    };

    let product = p.update_product(&mut store, "flat", "fries", &update).unwrap();
    assert_eq!(product.category, "food");
    assert_eq!(store.reader().product("fries").unwrap().unwrap().category, "food");
}
