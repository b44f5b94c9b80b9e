//! ledger-runner: headless replay of a venue loyalty network.
//!
//! Seeds venues, products and a referral tree, then plays a deterministic
//! stream of purchases day by day and checks the ledger invariants.
//!
//! Usage:
//!   ledger-runner --seed 12345 --days 60 --users 80 --db run.db
//!   ledger-runner --config ./data/ledger_config.json

mod rng;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use loyalty_core::{
    AuthenticatedUser, ErrorKind, LedgerConfig, LedgerStore, LineItem, ManualClock, Product,
    PurchaseRequest, TransactionKind, TransactionProcessor, Venue,
};
use rng::{RngBank, StreamSlot};
use rust_decimal::{Decimal, RoundingStrategy};
use std::{collections::BTreeMap, env, path::Path, sync::Arc};

#[derive(Default)]
struct RunStats {
    settled:  u64,
    rejected: BTreeMap<String, u64>,
    refunded: u64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let days = parse_arg(&args, "--days", 30u32);
    let users = parse_arg(&args, "--users", 40usize);
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let config_path = str_arg(&args, "--config").unwrap_or("./data/ledger_config.json");

    let config = if Path::new(config_path).exists() {
        LedgerConfig::load(config_path)?
    } else {
        log::warn!("config {config_path} not found, using defaults");
        LedgerConfig::default()
    };

    println!("Venue loyalty ledger: ledger-runner");
    println!("  seed:    {seed}");
    println!("  days:    {days}");
    println!("  users:   {users}");
    println!("  db:      {db}");
    println!("  config:  {config_path}");
    println!();

    let mut store = LedgerStore::open(db)?;
    store.migrate()?;
    store.set_busy_timeout(config.busy_timeout_ms)?;

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 18, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid start instant"))?;
    let clock = Arc::new(ManualClock::new(start));
    let processor = TransactionProcessor::new(config, clock.clone());

    let bank = RngBank::new(seed);
    let venues = seed_venues(&store)?;
    let user_ids = seed_users(&processor, &mut store, &bank, users)?;

    // A happy-hour promotion at the first venue.
    processor.activate_product_bonus(
        &mut store,
        "v-schlachthof",
        "v-schlachthof-gin-tonic",
        Decimal::TWO,
        None,
        None,
        Some("Happy hour".into()),
    )?;

    let mut visits = bank.stream(StreamSlot::Visits);
    let mut baskets = bank.stream(StreamSlot::Baskets);
    let mut payments = bank.stream(StreamSlot::Payments);
    let mut refunds = bank.stream(StreamSlot::Refunds);
    let mut stats = RunStats::default();

    for day in 0..days {
        for (i, user_id) in user_ids.iter().enumerate() {
            if !visits.chance(0.35) {
                continue;
            }
            // Regulars mostly return to their home venue.
            let (venue, products) = if visits.chance(0.7) {
                &venues[i % venues.len()]
            } else {
                visits.pick(&venues)
            };

            let items: Vec<LineItem> = (0..1 + baskets.below(4))
                .map(|_| {
                    let p = baskets.pick(products);
                    LineItem {
                        product_id: Some(p.product_id.clone()),
                        name:       p.name.clone(),
                        quantity:   1 + baskets.below(2) as u32,
                        price:      p.price,
                        category:   None,
                    }
                })
                .collect();
            let total: Decimal = items.iter().map(LineItem::total).sum::<Result<Decimal, _>>()?;

            let available = store
                .reader()
                .balance(user_id, &venue.venue_id)?
                .map_or(Decimal::ZERO, |b| b.points_available);
            let points = if payments.chance(0.3) {
                available
                    .min(total / Decimal::TWO)
                    .round_dp_with_strategy(2, RoundingStrategy::ToZero)
            } else {
                Decimal::ZERO
            };

            let request = PurchaseRequest::split(venue.venue_id.clone(), total - points, points)
                .with_items(items)
                .with_idempotency_key(format!("{user_id}-d{day}-{}", venue.venue_id));
            let user = AuthenticatedUser::new(user_id.clone());

            match processor.create_transaction(&mut store, &user, &request) {
                Ok(settlement) => {
                    stats.settled += 1;
                    if refunds.chance(0.02) {
                        match processor.refund_transaction(
                            &mut store,
                            &settlement.transaction.transaction_id,
                            "Order returned",
                        ) {
                            Ok(_) => stats.refunded += 1,
                            Err(e) => record_rejection(&mut stats, e.kind(), "refund"),
                        }
                    }
                }
                Err(e) => record_rejection(&mut stats, e.kind(), "purchase"),
            }
        }
        clock.advance_days(1);
    }

    print_summary(&store, &stats, days)?;
    verify_invariants(&store)
}

fn seed_venues(store: &LedgerStore) -> Result<Vec<(Venue, Vec<Product>)>> {
    let ledger = store.reader();
    let specs = [
        ("v-schlachthof", "Schlachthof", Some(30), Some(80), Some(50), Decimal::ONE),
        ("v-kulturpalast", "Kulturpalast", None, Some(70), Some(40), Decimal::ONE),
        ("v-parkcafe", "Park Café", Some(45), Some(60), None, Decimal::new(15, 1)),
    ];
    let menu = [
        ("Pils 0.4", "beverages", 450),
        ("Gin Tonic", "drinks", 900),
        ("Currywurst", "food", 650),
        ("Flammkuchen", "street_food", 1100),
        ("Tour shirt", "merch", 2500),
    ];

    let mut venues = Vec::new();
    for (id, name, food, bev, default, multiplier) in specs {
        let venue = Venue::new(id, name)
            .with_margins(food.map(Decimal::from), bev.map(Decimal::from), default.map(Decimal::from))
            .with_multiplier(multiplier);
        ledger.insert_venue(&venue)?;

        let mut products = Vec::new();
        for (pname, category, cents) in menu {
            let product = Product::new(
                format!("{id}-{}", pname.to_lowercase().replace(' ', "-")),
                id,
                pname,
                category,
                Decimal::new(cents, 2),
            );
            ledger.insert_product(&product)?;
            products.push(product);
        }
        venues.push((venue, products));
    }
    Ok(venues)
}

/// Users join one at a time; most sign up with an earlier user's code.
fn seed_users(
    processor: &TransactionProcessor,
    store: &mut LedgerStore,
    bank: &RngBank,
    count: usize,
) -> Result<Vec<String>> {
    let mut rng = bank.stream(StreamSlot::Population);
    let mut ids: Vec<String> = Vec::with_capacity(count);
    for i in 0..count {
        let id = format!("user-{i:04}");
        if i > 0 && rng.chance(0.8) {
            let referrer = ids[rng.below(i)].clone();
            processor.register_referral(store, &id, &referrer)?;
        }
        ids.push(id);
    }
    Ok(ids)
}

fn record_rejection(stats: &mut RunStats, kind: ErrorKind, op: &str) {
    *stats.rejected.entry(format!("{op}/{kind:?}")).or_default() += 1;
}

fn print_summary(store: &LedgerStore, stats: &RunStats, days: u32) -> Result<()> {
    let ledger = store.reader();

    println!("=== RUN SUMMARY ===");
    println!("  days run:        {days}");
    println!("  settled:         {}", stats.settled);
    println!("  refunded:        {}", stats.refunded);
    for (what, n) in &stats.rejected {
        println!("  rejected {what:<18} {n}");
    }
    println!();

    println!("=== TRANSACTIONS ===");
    for kind in [
        TransactionKind::Purchase,
        TransactionKind::StreakBonus,
        TransactionKind::ReferralBonus,
        TransactionKind::AdminAdjustment,
        TransactionKind::Refund,
    ] {
        println!("  {:<18} {}", kind.as_str(), ledger.transaction_count(kind)?);
    }
    println!();

    println!("=== VENUES ===");
    for venue in ledger.venues()? {
        println!(
            "  {:<14} revenue {:>10.2}  points issued {:>9.2}",
            venue.name, venue.total_revenue, venue.total_points_issued
        );
    }
    Ok(())
}

fn verify_invariants(store: &LedgerStore) -> Result<()> {
    let balances = store.reader().all_balances()?;
    let broken: Vec<_> = balances.iter().filter(|b| !b.is_consistent()).collect();
    if let Some(b) = broken.first() {
        anyhow::bail!(
            "{} inconsistent balances, e.g. {}@{}: earned {} spent {} available {}",
            broken.len(),
            b.user_id,
            b.venue_id,
            b.points_earned,
            b.points_spent,
            b.points_available
        );
    }
    println!();
    println!("  {} balances consistent", balances.len());
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
