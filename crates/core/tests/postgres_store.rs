//! Runs against a live database. Set DATABASE_URL and pass `--ignored`.

use chrono::NaiveDate;

use trapvalue_core::domain::market::{MarketCapTier, PricePoint};
use trapvalue_core::domain::snapshot::{Difficulty, Outcome, OutcomeLabel};
use trapvalue_core::storage::postgres::PgStore;
use trapvalue_core::storage::{GameStore, NewInstrument, SeedStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn instrument(ticker: &str) -> NewInstrument {
    NewInstrument {
        ticker: ticker.to_string(),
        company_name: format!("{ticker} Inc"),
        display_name: format!("{ticker} Display"),
        sector: Some("Technology".to_string()),
        industry: None,
        market_cap_tier: MarketCapTier::Mid,
    }
}

async fn store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .unwrap();
    trapvalue_core::storage::migrate(&pool).await.unwrap();
    Some(PgStore::new(pool))
}

async fn cleanup(store: &PgStore, tickers: &[&str]) {
    let tickers: Vec<String> = tickers.iter().map(|t| t.to_string()).collect();
    for table in ["snapshots", "price_history", "financial_years"] {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE instrument_id IN (SELECT id FROM instruments WHERE ticker = ANY($1))"
        ))
        .bind(&tickers)
        .execute(store.pool())
        .await
        .unwrap();
    }
    sqlx::query("DELETE FROM instruments WHERE ticker = ANY($1)")
        .bind(&tickers)
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn rolled_back_instrument_leaves_no_rows() {
    let Some(store) = store().await else {
        return;
    };
    let tag = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    let kept = format!("K{tag}");
    let dropped = format!("D{tag}");

    let mut session = store.open_session().await.unwrap();

    session.begin_instrument().await.unwrap();
    let kept_id = session.upsert_instrument(&instrument(&kept)).await.unwrap();
    let prices = [PricePoint::new(d(2020, 1, 2), 10.0), PricePoint::new(d(2020, 1, 3), 11.0)];
    assert_eq!(session.insert_prices_if_absent(kept_id, &prices).await.unwrap(), 2);
    assert_eq!(session.insert_prices_if_absent(kept_id, &prices).await.unwrap(), 0);
    let outcome = Outcome {
        snapshot_date: d(2020, 1, 2),
        price_at_snapshot: 10.0,
        price_at_6mo: None,
        price_at_12mo: None,
        price_at_24mo: 14.0,
        return_6mo: None,
        return_12mo: None,
        return_24mo: 0.4,
        outcome_label: OutcomeLabel::Value,
        difficulty: Difficulty::Medium,
    };
    assert!(session.insert_snapshot_if_absent(kept_id, &outcome).await.unwrap());
    session.finish_instrument().await.unwrap();

    session.begin_instrument().await.unwrap();
    let dropped_id = session.upsert_instrument(&instrument(&dropped)).await.unwrap();
    session
        .insert_prices_if_absent(dropped_id, &prices)
        .await
        .unwrap();
    session.abandon_instrument().await.unwrap();

    // The transaction is still usable after the rollback.
    let found = session.find_instrument(&kept).await.unwrap().unwrap();
    assert_eq!(found.id, kept_id);
    assert!(session.find_instrument(&dropped).await.unwrap().is_none());

    session.commit().await.unwrap();
    session.close().await.unwrap();

    let history = store
        .prices_between(kept_id, d(2020, 1, 1), d(2020, 12, 31))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(store
        .prices_between(dropped_id, d(2020, 1, 1), d(2020, 12, 31))
        .await
        .unwrap()
        .is_empty());

    cleanup(&store, &[&kept, &dropped]).await;
}
