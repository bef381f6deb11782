use super::*;

#[tokio::test(start_paused = true)]
async fn test_allows_up_to_limit() {
    let limiter = RateLimiter::new();
    let config = RateLimitConfig::per_second(3);

    for expected_remaining in [2, 1, 0] {
        let result = limiter.acquire("search_documents", config).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, expected_remaining);
    }

    let denied = limiter.acquire("search_documents", config).await;
    assert!(!denied.allowed);
    assert!(denied.reset_after <= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_window_slides() {
    let limiter = RateLimiter::new();
    let config = RateLimitConfig::per_second(2);

    assert!(limiter.acquire("t", config).await.allowed);
    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(limiter.acquire("t", config).await.allowed);
    assert!(!limiter.acquire("t", config).await.allowed);

    // first call leaves the window
    tokio::time::advance(Duration::from_millis(450)).await;
    assert!(limiter.acquire("t", config).await.allowed);
    assert_eq!(limiter.usage("t", config).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let limiter = RateLimiter::new();
    let config = RateLimitConfig::per_minute(1);

    assert!(limiter.acquire("a", config).await.allowed);
    assert!(limiter.acquire("b", config).await.allowed);
    assert!(!limiter.acquire("a", config).await.allowed);

    limiter.reset("a").await;
    assert!(limiter.acquire("a", config).await.allowed);
}
