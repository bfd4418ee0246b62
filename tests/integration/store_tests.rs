use super::*;
use chrono::{Duration, TimeZone, Utc};
use pricewatch::models::{ItemUpdate, NewTrackedItem, PricePoint, Subscriber};
use pricewatch::store::RecordStore;
use pricewatch::utils::error::StoreError;

fn update(prices: &[f64], hour: u32) -> ItemUpdate {
    let at = |h: u32| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
    ItemUpdate {
        title: "Standing Desk".to_string(),
        attributes: ItemAttributes {
            currency: Some("EUR".to_string()),
            original_price: Some(499.0),
            ..ItemAttributes::default()
        },
        price_history: prices
            .iter()
            .enumerate()
            .map(|(i, price)| PricePoint {
                price: *price,
                observed_at: at(i as u32),
            })
            .collect(),
        current_price: prices.last().copied(),
        // Deliberately wrong; the store derives its own figures
        lowest_price: Some(1.0),
        highest_price: Some(1.0),
        average_price: Some(1.0),
        is_out_of_stock: false,
        last_updated: at(hour),
    }
}

#[tokio::test]
async fn test_upsert_creates_missing_record() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/desk";

    let item = store.upsert(key, update(&[420.0, 399.0], 5)).await?;

    assert_eq!(item.key, key);
    assert_eq!(item.title, "Standing Desk");
    assert_eq!(item.attributes.currency.as_deref(), Some("EUR"));
    assert_eq!(item.attributes.original_price, Some(499.0));
    assert_eq!(item.current_price, Some(399.0));
    assert_eq!(item.lowest_price, Some(399.0));
    assert_eq!(item.highest_price, Some(420.0));
    assert_eq!(item.average_price, Some(409.5));
    assert_eq!(item.price_history.len(), 2);
    assert_eq!(item.last_updated, Some(Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap()));

    assert_eq!(store.get(key).await?, Some(item));
    Ok(())
}

#[tokio::test]
async fn test_upsert_appends_history_and_keeps_created_at() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/desk";

    let first = store.upsert(key, update(&[420.0], 1)).await?;
    let second = store.upsert(key, update(&[420.0, 380.0, 410.0], 3)).await?;

    assert_eq!(second.created_at, first.created_at);
    let prices: Vec<f64> = second.price_history.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![420.0, 380.0, 410.0]);
    assert_eq!(second.lowest_price, Some(380.0));
    assert!(second.last_updated > first.last_updated);
    Ok(())
}

#[tokio::test]
async fn test_upsert_refuses_to_shrink_history() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/desk";
    store.upsert(key, update(&[420.0, 399.0], 1)).await?;

    let err = store.upsert(key, update(&[420.0], 2)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::HistoryRegression {
            stored: 2,
            proposed: 1,
            ..
        }
    ));

    // Nothing from the rejected write is visible
    let item = store.get(key).await?.expect("item is stored");
    assert_eq!(item.price_history.len(), 2);
    assert_eq!(item.last_updated, Some(Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap()));
    Ok(())
}

#[tokio::test]
async fn test_upsert_refuses_rewritten_history() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/desk";
    store.upsert(key, update(&[420.0, 399.0], 1)).await?;

    // Same length plus one, but the last stored price was changed
    let err = store.upsert(key, update(&[420.0, 350.0, 380.0], 2)).await.unwrap_err();
    assert!(matches!(err, StoreError::HistoryDiverged { position: 1, .. }));

    let item = store.get(key).await?.expect("item is stored");
    let prices: Vec<f64> = item.price_history.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![420.0, 399.0]);

    // A genuine extension is still accepted
    let extended = store.upsert(key, update(&[420.0, 399.0, 380.0], 3)).await?;
    assert_eq!(extended.price_history.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_out_of_stock_update_clears_current_price() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/desk";

    let mut out = update(&[420.0], 2);
    out.is_out_of_stock = true;
    let item = store.upsert(key, out).await?;

    assert!(item.is_out_of_stock);
    assert_eq!(item.current_price, None);
    assert_eq!(item.lowest_price, Some(420.0));
    Ok(())
}

#[tokio::test]
async fn test_select_due_orders_never_refreshed_first() -> anyhow::Result<()> {
    let store = memory_store().await?;
    store.upsert("https://shop.example/old", update(&[1.0], 1)).await?;
    store.upsert("https://shop.example/recent", update(&[1.0], 9)).await?;
    for key in ["https://shop.example/new-b", "https://shop.example/new-a"] {
        store
            .track(NewTrackedItem {
                key: key.to_string(),
                title: None,
            })
            .await?;
    }

    let due: Vec<String> = store.select_due(10).await?.into_iter().map(|i| i.key).collect();
    assert_eq!(
        due,
        vec![
            "https://shop.example/new-a",
            "https://shop.example/new-b",
            "https://shop.example/old",
            "https://shop.example/recent",
        ]
    );

    assert_eq!(store.select_due(1).await?.len(), 1);
    assert!(store.select_due(0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_track_is_idempotent() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let new_item = NewTrackedItem {
        key: "https://shop.example/lamp".to_string(),
        title: Some("Desk Lamp".to_string()),
    };

    let first = store.track(new_item.clone()).await?;
    let second = store
        .track(NewTrackedItem {
            title: Some("Renamed".to_string()),
            ..new_item
        })
        .await?;

    assert_eq!(first, second);
    assert_eq!(second.title, "Desk Lamp");
    assert_eq!(second.last_updated, None);
    Ok(())
}

#[tokio::test]
async fn test_subscribe_updates_existing_target() -> anyhow::Result<()> {
    let store = memory_store().await?;
    let key = "https://shop.example/lamp";
    store
        .track(NewTrackedItem {
            key: key.to_string(),
            title: None,
        })
        .await?;

    store.subscribe(key, Subscriber::with_target("a@example.com", 30.0)).await?;
    store.subscribe(key, Subscriber::new("b@example.com")).await?;
    let item = store.subscribe(key, Subscriber::with_target("a@example.com", 25.0)).await?;

    assert_eq!(
        item.subscribers,
        vec![
            Subscriber::with_target("a@example.com", 25.0),
            Subscriber::new("b@example.com"),
        ]
    );

    let missing = store
        .subscribe("https://shop.example/none", Subscriber::new("a@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_on_disk_database_survives_reconnect() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("pricewatch.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", path.display()),
        ..DatabaseConfig::default()
    };
    let key = "https://shop.example/desk";

    {
        let store = SqliteStore::connect(&config).await?;
        store.upsert(key, update(&[420.0], 1)).await?;
        store.pool().close().await;
    }

    let store = SqliteStore::connect(&config).await?;
    let item = store.get(key).await?.expect("item survives reconnect");
    assert_eq!(item.price_history.len(), 1);
    assert!(item.created_at <= Utc::now());
    assert!(item.created_at > Utc::now() - Duration::minutes(5));
    Ok(())
}
