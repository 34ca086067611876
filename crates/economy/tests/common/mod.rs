#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use economy::{
    BadgeDefinition, Economy, EconomySettings, EconomyStore, ManualClock, SqlStore,
};
use migration::MigratorTrait;

pub struct Harness {
    pub economy: Economy,
    pub clock: Arc<ManualClock>,
    pub store: Arc<SqlStore>,
}

/// Monday morning, UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn database() -> DatabaseConnection {
    init_tracing();
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

/// Defaults with a short retry backoff.
pub fn settings() -> EconomySettings {
    let mut settings = EconomySettings::default();
    settings.orchestrator.backoff_ms = 1;
    settings
}

pub async fn harness() -> Harness {
    build(None).await
}

pub async fn harness_with_catalog(catalog: Vec<BadgeDefinition>) -> Harness {
    build(Some(catalog)).await
}

async fn build(catalog: Option<Vec<BadgeDefinition>>) -> Harness {
    let store = Arc::new(SqlStore::new(database().await));
    let clock = Arc::new(ManualClock::new(start()));
    let mut builder = Economy::builder()
        .store(store.clone())
        .clock(clock.clone())
        .settings(settings());
    if let Some(catalog) = catalog {
        builder = builder.badge_catalog(catalog);
    }
    Harness {
        economy: builder.build().unwrap(),
        clock,
        store,
    }
}

/// Economy over an arbitrary store, e.g. a fault-injecting wrapper.
pub fn economy_over(store: Arc<dyn EconomyStore>, clock: Arc<ManualClock>) -> Economy {
    Economy::builder()
        .store(store)
        .clock(clock)
        .settings(settings())
        .build()
        .unwrap()
}

/// Ledger sum and cached balance must agree.
pub async fn assert_consistent(economy: &Economy, child_id: &str) {
    let audit = economy.audit(child_id).await.unwrap();
    assert!(
        audit.is_consistent(),
        "ledger {} vs cached {}",
        audit.ledger_sum,
        audit.cached_balance
    );
}
