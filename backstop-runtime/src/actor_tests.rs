#[cfg(test)]
mod tests {
    use crate::actor::{LimiterHandle, RateLimiterActor};
    use crate::config::LimiterConfig;
    use crate::error::{ConfigError, LimiterError};
    use http::HeaderMap;
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn spawn(bucket_size: u64, refill_rate: u64, refill_interval_ms: u64) -> LimiterHandle {
        RateLimiterActor::spawn(
            LimiterConfig::new("test")
                .bucket_size(bucket_size)
                .refill_rate(refill_rate)
                .refill_interval_ms(refill_interval_ms),
        )
        .unwrap()
    }

    fn remaining(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", value.parse().unwrap());
        headers
    }

    async fn drain(handle: &LimiterHandle, count: u64) {
        for _ in 0..count {
            handle.acquire(Some(Duration::ZERO)).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait_for_refill() {
        let handle = spawn(5, 1, 1_000);
        let start = Instant::now();

        drain(&handle, 5).await;
        assert_eq!(handle.get_state().await.unwrap().tokens, 0);

        // Sixth caller has to wait for the first refill tick
        assert_ok!(handle.acquire(Some(Duration::from_secs(2))).await);
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.tokens, 0);
        assert_eq!(state.waiting_count, 0);
        assert_eq!(state.acquired_total, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_bucket_size() {
        let handle = spawn(5, 3, 100);
        drain(&handle, 1).await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.get_state().await.unwrap().tokens, 5);
    }

    #[tokio::test]
    async fn test_sync_lowers_tokens() {
        let handle = spawn(5, 1, 1_000);

        handle.update_from_headers(&remaining("2"));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.tokens, 2);
        assert_eq!(state.observed_remaining, Some(2));
    }

    #[tokio::test]
    async fn test_sync_never_grants_tokens() {
        let handle = spawn(5, 1, 60_000);
        drain(&handle, 4).await;

        handle.update_from_headers(&remaining("100"));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.tokens, 1);
        assert_eq!(state.observed_remaining, Some(100));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let handle = spawn(5, 1, 60_000);

        handle.update_from_headers(&remaining("2"));
        handle.update_from_headers(&remaining("2"));

        assert_eq!(handle.get_state().await.unwrap().tokens, 2);
    }

    #[tokio::test]
    async fn test_sync_records_limit_and_reset() {
        let handle = spawn(5, 1, 60_000);
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", "5000".parse().unwrap());
        headers.insert("x-ratelimit-reset", "1700000000".parse().unwrap());

        handle.update_from_headers(&headers);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.observed_limit, Some(5000));
        assert_eq!(state.observed_reset, Some(1_700_000_000));
        assert_eq!(state.observed_remaining, None);
        assert_eq!(state.tokens, 5);
    }

    #[tokio::test]
    async fn test_headers_without_rate_limit_info_ignored() {
        let handle = spawn(5, 1, 60_000);
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        handle.update_from_headers(&headers);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.tokens, 5);
        assert_eq!(state.observed_remaining, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_fails_immediately() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;
        let start = Instant::now();

        let err = assert_err!(handle.acquire(Some(Duration::ZERO)).await);

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::ZERO);
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.waiting_count, 0);
        assert_eq!(state.timeouts_total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_caller_times_out() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;
        let start = Instant::now();

        let err = handle
            .acquire(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LimiterError::Timeout {
                name: "test".to_string(),
                waited: Duration::from_millis(100),
            }
        );
        assert_eq!(start.elapsed(), Duration::from_millis(100));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.waiting_count, 0);
        assert_eq!(state.tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_used() {
        let handle = RateLimiterActor::spawn(
            LimiterConfig::new("test")
                .bucket_size(1)
                .refill_interval_ms(60_000)
                .default_wait_timeout_ms(250),
        )
        .unwrap();
        drain(&handle, 1).await;
        let start = Instant::now();

        let err = handle.acquire(None).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_deadline_expires_behind_blocked_head() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;

        let head = handle.clone();
        let head_task =
            tokio::spawn(async move { head.acquire(Some(Duration::from_secs(5))).await });
        tokio::task::yield_now().await;

        let err = handle
            .acquire(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.waiting_count, 1);

        assert!(head_task.await.unwrap().unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_order() {
        let handle = spawn(1, 1, 100);
        drain(&handle, 1).await;
        let start = Instant::now();

        let timed = |handle: LimiterHandle| async move {
            handle.acquire(Some(Duration::from_secs(5))).await.unwrap();
            start.elapsed()
        };

        let (first, second, third) = futures::join!(
            timed(handle.clone()),
            timed(handle.clone()),
            timed(handle.clone())
        );

        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(third, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_caller_cannot_jump_queue() {
        let handle = spawn(1, 1, 1_000);
        drain(&handle, 1).await;

        let queued = handle.clone();
        let queued_task =
            tokio::spawn(async move { queued.acquire(Some(Duration::from_secs(5))).await });
        tokio::task::yield_now().await;

        // The refill goes to the queued caller, so this one still finds the bucket empty
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let err = handle.acquire(Some(Duration::ZERO)).await.unwrap_err();
        assert!(err.is_timeout());

        assert_ok!(queued_task.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_consumes_no_token() {
        let handle = spawn(1, 1, 1_000);
        drain(&handle, 1).await;

        // Queue a caller, then drop its future
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), handle.acquire(Some(Duration::from_secs(5))))
                .await;
        assert!(abandoned.is_err());

        assert_ok!(handle.acquire(Some(Duration::from_secs(5))).await);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.acquired_total, 2);
        assert_eq!(state.waiting_count, 0);
        assert_eq!(state.tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_not_counted() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            handle.acquire(Some(Duration::from_secs(30))),
        )
        .await;
        assert!(abandoned.is_err());

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.waiting_count, 0);
        assert_eq!(state.timeouts_total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_on_refill_tick_is_served() {
        let handle = spawn(1, 1, 1_000);
        drain(&handle, 1).await;
        let start = Instant::now();

        // Each deadline lands exactly on the tick that brings the next token
        for tick in 1..=5u64 {
            assert_ok!(handle.acquire(Some(Duration::from_millis(1_000))).await);
            assert_eq!(start.elapsed(), Duration::from_secs(tick));
        }

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.acquired_total, 6);
        assert_eq!(state.timeouts_total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_in_middle_of_queue() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;

        let closed = LimiterError::Closed {
            name: "test".to_string(),
        };

        let (first, middle, last, ()) = futures::join!(
            handle.acquire(Some(Duration::from_secs(5))),
            handle.acquire(Some(Duration::from_millis(100))),
            handle.acquire(Some(Duration::from_secs(5))),
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                assert_eq!(handle.get_state().await.unwrap().waiting_count, 2);
                handle.shutdown();
            }
        );

        assert!(assert_err!(middle).is_timeout());
        assert_eq!(assert_err!(first), closed);
        assert_eq!(assert_err!(last), closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_does_not_release_waiters() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;

        let waiter = handle.clone();
        let waiter_task =
            tokio::spawn(async move { waiter.acquire(Some(Duration::from_secs(1))).await });
        tokio::task::yield_now().await;

        handle.update_from_headers(&remaining("50"));

        assert!(waiter_task.await.unwrap().unwrap_err().is_timeout());
        assert_eq!(handle.get_state().await.unwrap().tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_waiters() {
        let handle = spawn(1, 1, 60_000);
        drain(&handle, 1).await;

        let waiter = handle.clone();
        let waiter_task =
            tokio::spawn(async move { waiter.acquire(Some(Duration::from_secs(5))).await });
        tokio::task::yield_now().await;

        handle.shutdown();

        let closed = LimiterError::Closed {
            name: "test".to_string(),
        };
        assert_eq!(waiter_task.await.unwrap().unwrap_err(), closed);
        assert_eq!(handle.acquire(None).await.unwrap_err(), closed);
        assert_eq!(handle.get_state().await.unwrap_err(), closed);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_acquires() {
        let handle = spawn(10, 1, 60_000);

        let mut tasks = vec![];
        for _ in 0..20 {
            let h = handle.clone();
            tasks.push(tokio::spawn(async move {
                h.acquire(Some(Duration::ZERO)).await
            }));
        }

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.acquired_total, 10);
        assert_eq!(state.timeouts_total, 10);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = RateLimiterActor::spawn(LimiterConfig::new("test").refill_rate(0));
        assert!(matches!(
            result,
            Err(ConfigError::NonPositive {
                field: "refill_rate",
                ..
            })
        ));
    }
}
