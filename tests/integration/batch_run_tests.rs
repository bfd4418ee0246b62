use super::*;
use pricewatch::classifier::NotificationKind;
use pricewatch::refresher::BatchRefresher;
use pricewatch::store::RecordStore;
use pricewatch::AppError;

const A: &str = "https://shop.example/a";
const B: &str = "https://shop.example/b";
const C: &str = "https://shop.example/c";

#[tokio::test]
async fn test_one_failing_item_does_not_stop_the_batch() -> anyhow::Result<()> {
    let source = ScriptedSource::default()
        .script(A, [Step::Price(10.0)])
        .script(B, [Step::Status(404)])
        .script(C, [Step::Price(30.0)]);
    let harness = TestHarness::new(source).await?;
    for key in [A, B, C] {
        harness.track(key, None).await?;
    }

    let result = harness.runner().run().await?;

    let updated: Vec<&str> = result.updated.iter().map(|item| item.key.as_str()).collect();
    assert_eq!(updated, vec![A, C]);
    assert_eq!(result.failed_keys(), vec![B]);
    assert_eq!(result.failures[0].stage, "fetch");
    assert!(result.failures[0].error.contains("404"));

    // The failed item keeps its place at the front of the queue
    let due = harness.store.select_due(3).await?;
    assert_eq!(due[0].key, B);
    assert_eq!(due[0].last_updated, None);
    assert!(due[0].price_history.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_batch_size_limits_selection_to_most_overdue() -> anyhow::Result<()> {
    let source = ScriptedSource::default()
        .script(A, [Step::Price(10.0)])
        .script(B, [Step::Price(20.0)])
        .script(C, [Step::Price(30.0)]);
    let harness = TestHarness::new(source).await?;
    for key in [A, B, C] {
        harness.track(key, None).await?;
    }

    let refresher = harness.runner().refresher().clone();
    let first = refresher.run_batch(2).await?;
    assert_eq!(first.success_count(), 2);
    assert_eq!(harness.source.calls(), vec![A.to_string(), B.to_string()]);

    // C has never been refreshed, so it goes ahead of A and B
    let second = refresher.run_batch(1).await?;
    assert_eq!(second.updated[0].key, C);
    Ok(())
}

#[tokio::test]
async fn test_out_of_stock_then_back_in_stock() -> anyhow::Result<()> {
    let source = ScriptedSource::default().script(
        A,
        [Step::Price(100.0), Step::OutOfStock, Step::Price(120.0)],
    );
    let harness = TestHarness::new(source).await?;
    harness.track(A, Some(("watcher@example.com", 80.0))).await?;

    harness.runner().run().await?;

    let out = harness.runner().run().await?;
    assert!(out.notifications.is_empty());
    let item = harness.store.get(A).await?.expect("item is stored");
    assert!(item.is_out_of_stock);
    assert_eq!(item.current_price, None);
    assert_eq!(item.price_history.len(), 1);
    assert_eq!(item.lowest_price, Some(100.0));

    let back = harness.runner().run().await?;
    assert_eq!(back.notifications.len(), 1);
    assert_eq!(back.notifications[0].kind, NotificationKind::BackInStock);

    let item = harness.store.get(A).await?.expect("item is stored");
    assert!(!item.is_out_of_stock);
    assert_eq!(item.current_price, Some(120.0));
    assert_eq!(item.price_history.len(), 2);
    assert_eq!(item.average_price, Some(110.0));

    let sent = harness.dispatcher.sent();
    assert!(sent.last().unwrap().subject.ends_with("is back in stock!"));
    Ok(())
}

#[tokio::test]
async fn test_price_drop_reaches_every_subscriber() -> anyhow::Result<()> {
    let source = ScriptedSource::default().script(A, [Step::Price(50.0), Step::Price(55.0), Step::Price(52.0)]);
    let harness = TestHarness::new(source).await?;
    harness.track(A, Some(("early@example.com", 40.0))).await?;

    harness.runner().run().await?;
    harness.track(A, Some(("late@example.com", 53.0))).await?;
    let steady = harness.runner().run().await?;
    assert!(steady.notifications.is_empty());

    // A drop outranks the crossed 53 target, so everyone hears about it
    let result = harness.runner().run().await?;
    assert_eq!(result.notifications.len(), 1);
    assert_eq!(result.notifications[0].kind, NotificationKind::PriceDrop);
    assert_eq!(result.notifications[0].recipients, 2);

    let sent = harness.dispatcher.sent();
    assert_eq!(
        sent.last().unwrap().recipients,
        vec!["early@example.com".to_string(), "late@example.com".to_string()]
    );
    assert!(sent.last().unwrap().subject.starts_with("Price drop alert"));
    Ok(())
}

#[tokio::test]
async fn test_dispatch_failure_still_persists() -> anyhow::Result<()> {
    let source = ScriptedSource::default().script(A, [Step::Price(25.0)]);
    let harness = TestHarness::with_dispatcher(source, RecordingDispatcher::failing()).await?;
    harness.track(A, Some(("watcher@example.com", 30.0))).await?;

    let result = harness.runner().run().await?;

    assert_eq!(result.success_count(), 1);
    assert!(result.notifications.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].error.contains("relay refused connection"));

    let item = harness.store.get(A).await?.expect("item is stored");
    assert_eq!(item.current_price, Some(25.0));
    assert!(item.last_updated.is_some());
    Ok(())
}

#[tokio::test]
async fn test_repeated_refresh_keeps_created_at() -> anyhow::Result<()> {
    let source = ScriptedSource::default().script(A, [Step::Price(9.0), Step::Price(8.0)]);
    let harness = TestHarness::new(source).await?;
    let tracked = harness.track(A, None).await?;

    harness.runner().run().await?;
    let first = harness.store.get(A).await?.expect("item is stored");
    harness.runner().run().await?;
    let second = harness.store.get(A).await?.expect("item is stored");

    assert_eq!(first.created_at, tracked.created_at);
    assert_eq!(second.created_at, tracked.created_at);
    assert!(second.last_updated > first.last_updated);
    assert_eq!(second.title, "Test Product");
    Ok(())
}

#[tokio::test]
async fn test_runs_without_subscribers_send_nothing() -> anyhow::Result<()> {
    let source = ScriptedSource::default().script(A, [Step::Price(15.0), Step::Price(5.0)]);
    let harness = TestHarness::new(source).await?;
    harness.track(A, None).await?;

    harness.runner().run().await?;
    let result = harness.runner().run().await?;

    assert!(result.notifications.is_empty());
    assert!(harness.dispatcher.sent().is_empty());
    assert_eq!(
        harness.store.get(A).await?.and_then(|item| item.lowest_price),
        Some(5.0)
    );
    Ok(())
}

#[tokio::test]
async fn test_selection_failure_fails_the_run() -> anyhow::Result<()> {
    let store = memory_store().await?;
    store
        .track(pricewatch::models::NewTrackedItem {
            key: A.to_string(),
            title: None,
        })
        .await?;
    sqlx::query("DROP TABLE subscribers")
        .execute(store.pool())
        .await?;

    let refresher = BatchRefresher::new(
        store.clone(),
        Arc::new(ScriptedSource::default()),
        Arc::new(RecordingDispatcher::default()),
    );
    let err = refresher.run_batch(10).await.unwrap_err();
    assert!(matches!(err, AppError::Selection(_)));
    Ok(())
}
