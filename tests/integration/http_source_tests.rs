use super::*;
use pricewatch::config::ScraperConfig;
use pricewatch::sources::{HttpObservationSource, RetryPolicy, RetryingSource};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IN_STOCK_PAGE: &str = r#"
<html>
<head><meta property="og:image" content="https://cdn.example/grinder.jpg"></head>
<body>
    <h1>Burr Coffee Grinder</h1>
    <span itemprop="price" content="89.50">€89,50</span>
    <span class="original-price">€119.00</span>
    <link itemprop="availability" href="https://schema.org/InStock">
    <div id="availability"><span>In stock, ships tomorrow</span></div>
</body>
</html>
"#;

const SOLD_OUT_PAGE: &str = r#"
<html>
<body>
    <span id="productTitle">Burr Coffee Grinder</span>
    <div id="availability"><span>Currently unavailable.</span></div>
</body>
</html>
"#;

fn source() -> HttpObservationSource {
    let config = ScraperConfig {
        request_timeout: 5,
        ..ScraperConfig::default()
    };
    HttpObservationSource::new(&config).expect("client builds")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_fetch_extracts_observation_from_page() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/grinder"))
        .respond_with(html(IN_STOCK_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let observation = source().fetch(&format!("{}/grinder", server.uri())).await?;

    assert_eq!(observation.title, "Burr Coffee Grinder");
    assert_eq!(observation.current_price, Some(89.5));
    assert!(!observation.is_out_of_stock);
    assert_eq!(observation.attributes.original_price, Some(119.0));
    assert_eq!(observation.attributes.discount_rate, Some(25.0));
    assert_eq!(
        observation.attributes.image.as_deref(),
        Some("https://cdn.example/grinder.jpg")
    );
    Ok(())
}

#[tokio::test]
async fn test_fetch_detects_sold_out_page() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sold-out"))
        .respond_with(html(SOLD_OUT_PAGE))
        .mount(&server)
        .await;

    let observation = source().fetch(&format!("{}/sold-out", server.uri())).await?;

    assert!(observation.is_out_of_stock);
    assert_eq!(observation.current_price, None);
    Ok(())
}

#[tokio::test]
async fn test_missing_page_is_a_permanent_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let retrying = RetryingSource::new(
        source(),
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(50),
        },
    );
    let err = retrying
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_retry_recovers_from_unavailable_server() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/grinder"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/grinder"))
        .respond_with(html(IN_STOCK_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let retrying = RetryingSource::new(
        source(),
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(50),
        },
    );
    let observation = retrying.fetch(&format!("{}/grinder", server.uri())).await?;

    assert_eq!(observation.current_price, Some(89.5));
    Ok(())
}

#[tokio::test]
async fn test_invalid_locator_never_reaches_the_network() {
    let err = source().fetch("not a url").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidLocator(_)));
}
