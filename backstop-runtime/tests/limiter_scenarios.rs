use backstop::ResponseEnvelope;
use backstop_runtime::{LimiterConfig, LimiterError, LimiterRegistry, Settings};
use std::time::Duration;
use tokio::time::Instant;

fn github_settings() -> Settings {
    Settings::from_toml(
        r#"
        [[limiters]]
        name = "github"
        bucket_size = 5
        refill_rate = 1
        refill_interval_ms = 1000

        [[limiters]]
        name = "slack"
        bucket_size = 1
        refill_rate = 1
        refill_interval_ms = 60000
        default_wait_timeout_ms = 100
        "#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_six_callers_on_five_tokens() {
    let registry = LimiterRegistry::from_settings(&github_settings()).unwrap();
    let start = Instant::now();

    let results = futures::future::join_all(
        (0..6).map(|_| registry.acquire("github", Some(Duration::from_secs(2)))),
    )
    .await;

    assert!(results.iter().all(Result::is_ok));
    // The last caller waited for one refill tick
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    let state = registry.get_state("github").await.unwrap();
    assert_eq!(state.acquired_total, 6);
    assert_eq!(state.waiting_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_provider_headers_pull_bucket_down() {
    let registry = LimiterRegistry::from_settings(&github_settings()).unwrap();

    let response = ResponseEnvelope::builder(200)
        .header("X-RateLimit-Limit", "5000")
        .header("X-RateLimit-Remaining", "2")
        .header("X-RateLimit-Reset", "30")
        .build()
        .unwrap();
    registry.update_from_response("github", &response).unwrap();

    let state = registry.get_state("github").await.unwrap();
    assert_eq!(state.tokens, 2);
    assert_eq!(state.observed_limit, Some(5000));
    assert_eq!(state.observed_reset, Some(30));

    // Two more calls go straight through, the third has to wait
    registry.acquire("github", Some(Duration::ZERO)).await.unwrap();
    registry.acquire("github", Some(Duration::ZERO)).await.unwrap();
    let err = registry
        .acquire("github", Some(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_provider_then_refill() {
    let registry = LimiterRegistry::from_settings(&github_settings()).unwrap();

    let response = ResponseEnvelope::builder(429)
        .header("x-rate-limit-remaining", "0")
        .build()
        .unwrap();
    registry.update_from_response("github", &response).unwrap();
    assert_eq!(registry.get_state("github").await.unwrap().tokens, 0);

    // Local refill resumes on the next tick
    let start = Instant::now();
    registry
        .acquire("github", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_configured_default_timeout() {
    let registry = LimiterRegistry::from_settings(&github_settings()).unwrap();
    registry.acquire("slack", None).await.unwrap();

    let start = Instant::now();
    let err = registry.acquire("slack", None).await.unwrap_err();

    assert_eq!(
        err,
        LimiterError::Timeout {
            name: "slack".to_string(),
            waited: Duration::from_millis(100),
        }
    );
    assert_eq!(start.elapsed(), Duration::from_millis(100));
    assert_eq!(registry.get_state("slack").await.unwrap().waiting_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_limiters_are_independent() {
    let mut registry = LimiterRegistry::from_settings(&github_settings()).unwrap();
    registry
        .register(LimiterConfig::new("stripe").bucket_size(2))
        .unwrap();

    registry.acquire("slack", None).await.unwrap();
    assert!(
        registry
            .acquire("slack", Some(Duration::ZERO))
            .await
            .unwrap_err()
            .is_timeout()
    );

    registry.acquire("stripe", Some(Duration::ZERO)).await.unwrap();
    assert_eq!(registry.get_state("github").await.unwrap().tokens, 5);
    assert_eq!(registry.get_state("stripe").await.unwrap().tokens, 1);
    assert_eq!(registry.names(), vec!["github", "slack", "stripe"]);
}

#[tokio::test]
async fn test_shutdown_closes_every_limiter() {
    let registry = LimiterRegistry::from_settings(&github_settings()).unwrap();
    registry.shutdown();

    for name in ["github", "slack"] {
        assert_eq!(
            registry.acquire(name, None).await.unwrap_err(),
            LimiterError::Closed {
                name: name.to_string()
            }
        );
    }
}
