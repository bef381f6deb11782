use super::*;

fn fast_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::new()
        .with_cooldown(Duration::from_secs(60))
        .with_window(Duration::from_secs(300))
}

#[test]
fn test_config_defaults() {
    let config = CircuitBreakerConfig::default();
    assert_eq!(config.failure_rate_threshold, 0.5);
    assert_eq!(config.minimum_calls, 3);
    assert_eq!(config.window, Duration::from_secs(300));
    assert_eq!(config.cooldown, Duration::from_secs(60));
    assert_eq!(config.half_open_max_calls, 3);
    assert_eq!(config.success_threshold, 2);
}

#[test]
fn test_config_builder() {
    let config = CircuitBreakerConfig::new()
        .with_failure_rate_threshold(0.8)
        .with_minimum_calls(5)
        .with_window(Duration::from_secs(120))
        .with_cooldown(Duration::from_secs(10))
        .with_half_open_max_calls(1)
        .with_success_threshold(1);

    assert_eq!(config.failure_rate_threshold, 0.8);
    assert_eq!(config.minimum_calls, 5);
    assert_eq!(config.window, Duration::from_secs(120));
    assert_eq!(config.cooldown, Duration::from_secs(10));
    assert_eq!(config.half_open_max_calls, 1);
}

#[test]
fn test_initial_state() {
    let cb = CircuitBreaker::with_defaults("discrepancy");
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(cb.allow_request());
    assert!(!cb.is_open());
    assert_eq!(cb.stats().error_count, 0);
}

#[test]
fn test_three_consecutive_failures_open() {
    let cb = CircuitBreaker::new("discrepancy", fast_config());

    cb.record_failure();
    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Closed);

    cb.record_failure();
    assert!(cb.is_open());
    assert!(!cb.allow_request());

    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.error_count, 3);
    assert_eq!(stats.error_rate, 1.0);
}

#[test]
fn test_rate_below_threshold_stays_closed() {
    let cb = CircuitBreaker::new("timeline", fast_config());

    for _ in 0..3 {
        cb.record_success();
    }
    cb.record_failure();
    cb.record_failure();
    // 2 failures out of 5 calls
    assert_eq!(cb.state(), CircuitState::Closed);

    cb.record_failure();
    // 3 out of 6 reaches 50%
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_failures_outside_window_are_forgotten() {
    let cb = CircuitBreaker::new("risk", fast_config());

    cb.record_failure();
    cb.record_failure();
    tokio::time::advance(Duration::from_secs(301)).await;
    cb.record_failure();

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.stats().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_after_cooldown_on_next_check() {
    let cb = CircuitBreaker::new("risk", fast_config());
    for _ in 0..3 {
        cb.record_failure();
    }

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(cb.is_open());

    tokio::time::advance(Duration::from_secs(1)).await;
    // not eager: state is still open until something checks
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(!cb.is_open());
    assert_eq!(cb.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_allows_limited_probes() {
    let cb = CircuitBreaker::new("risk", fast_config().with_half_open_max_calls(3));
    for _ in 0..3 {
        cb.record_failure();
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(cb.allow_request());
    assert!(cb.allow_request());
    assert!(cb.allow_request());
    assert!(!cb.allow_request());
}

#[tokio::test(start_paused = true)]
async fn test_half_open_successes_close() {
    let cb = CircuitBreaker::new("risk", fast_config());
    for _ in 0..3 {
        cb.record_failure();
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(cb.allow_request());
    cb.record_success();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    assert!(cb.allow_request());
    cb.record_success();
    assert_eq!(cb.state(), CircuitState::Closed);

    // history cleared
    let stats = cb.stats();
    assert_eq!(stats.error_count, 0);
    assert_eq!(stats.error_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let cb = CircuitBreaker::new("risk", fast_config());
    for _ in 0..3 {
        cb.record_failure();
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(cb.allow_request());
    cb.record_success();
    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Open);

    // cooldown restarts from the reopen
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(cb.is_open());
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!cb.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_released_probe_frees_slot() {
    let cb = CircuitBreaker::new("risk", fast_config().with_half_open_max_calls(1));
    for _ in 0..3 {
        cb.record_failure();
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(cb.allow_request());
    assert!(!cb.allow_request());
    cb.release_probe();
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert!(cb.allow_request());
}

#[test]
fn test_release_probe_ignored_when_closed() {
    let cb = CircuitBreaker::new("risk", fast_config());
    cb.release_probe();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(cb.allow_request());
}

#[tokio::test(start_paused = true)]
async fn test_unsettled_probes_expire_after_cooldown() {
    let cb = CircuitBreaker::new("risk", fast_config());
    for _ in 0..3 {
        cb.record_failure();
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    for _ in 0..3 {
        assert!(cb.allow_request());
    }
    assert!(!cb.allow_request());

    // probes lost without a verdict; a new round starts after a cooldown
    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(!cb.allow_request());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(cb.allow_request());

    cb.record_success();
    assert!(cb.allow_request());
    cb.record_success();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[test]
fn test_reset() {
    let cb = CircuitBreaker::new("risk", fast_config());
    for _ in 0..3 {
        cb.record_failure();
    }
    assert!(cb.is_open());

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(cb.allow_request());
}

#[test]
fn test_registry_lazy_creation() {
    let registry = CircuitBreakerRegistry::new(fast_config());
    assert!(registry.peek("timeline").is_none());
    assert!(!registry.is_open("timeline"));
    assert!(registry.stats(Some("timeline")).is_empty());

    let a = registry.get("timeline");
    let b = registry.get("timeline");
    assert!(Arc::ptr_eq(&a, &b));

    registry.get("discrepancy");
    let names: Vec<_> = registry.stats(None).into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["discrepancy", "timeline"]);
}

#[test]
fn test_registry_shared_state_and_reset() {
    let registry = CircuitBreakerRegistry::new(fast_config());
    for _ in 0..3 {
        registry.get("discrepancy").record_failure();
    }
    assert!(registry.is_open("discrepancy"));
    assert_eq!(
        registry.stats(Some("discrepancy"))[0].state,
        CircuitState::Open
    );

    assert!(registry.reset("discrepancy"));
    assert!(!registry.is_open("discrepancy"));
    assert!(!registry.reset("unknown"));
}
