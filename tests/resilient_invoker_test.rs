//! End-to-end behavior of the resilient call path against scripted fakes

mod common;

use common::{fast, invoker_for, status, ScriptedOperation};
use recipe_resilience::config::{
    BackoffSettings, DependencyConfig, RecordingMode, ResilienceConfig,
};
use recipe_resilience::context::CallContext;
use recipe_resilience::error::ResilienceError;
use recipe_resilience::resilience::{
    CircuitState, FailureKind, FallbackReason, FallbackStrategy, ResilientInvoker, TransportError,
    ValueSource,
};
use std::time::Duration;

const DEP: &str = "recipe-importer";

fn tripping(config: DependencyConfig) -> DependencyConfig {
    fast(config)
        .without_cache()
        .with_max_attempts(1)
        .with_minimum_calls(2)
        .with_failure_rate_threshold(0.5)
        .with_cool_down(Duration::from_secs(1))
}

#[tokio::test]
async fn test_second_call_within_ttl_is_served_from_cache() {
    let (invoker, sink) = invoker_for(DEP, fast(DependencyConfig::default()));
    let fake = ScriptedOperation::always(Ok(vec!["flour".to_string(), "butter".to_string()]));
    let ctx = CallContext::new();

    let first: Vec<String> = invoker.call(&ctx, DEP, 42_i64, fake.operation()).await.unwrap();
    let second = invoker
        .call_detailed::<Vec<String>, _, _>(&ctx, DEP, 42_i64, fake.operation())
        .await
        .unwrap();

    assert_eq!(first, second.value);
    assert_eq!(second.source, ValueSource::Cache);
    assert_eq!(fake.calls(), 1);
    assert_eq!(sink.snapshot(&DEP.into()).calls, 1);
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let config = fast(DependencyConfig::default()).with_cache_ttl(Duration::from_millis(50));
    let (invoker, _) = invoker_for(DEP, config);
    let fake = ScriptedOperation::always(Ok(7_u64));
    let ctx = CallContext::new();

    let _: u64 = invoker.call(&ctx, DEP, "k", fake.operation()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    let _: u64 = invoker.call(&ctx, DEP, "k", fake.operation()).await.unwrap();

    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn test_cache_partitions_by_key_and_dependency() {
    let (invoker, _) = common::invoker_with(vec![
        ("a", fast(DependencyConfig::default())),
        ("b", fast(DependencyConfig::default())),
    ]);
    let fake = ScriptedOperation::always(Ok(1_u32));
    let ctx = CallContext::new();

    for (dep, key) in [("a", 1_i64), ("a", 2), ("b", 1), ("a", 1)] {
        let _: u32 = invoker.call(&ctx, dep, key, fake.operation()).await.unwrap();
    }

    assert_eq!(fake.calls(), 3);
}

#[tokio::test]
async fn test_two_failures_open_the_circuit_and_block_the_next_call() {
    let (invoker, sink) = invoker_for(DEP, tripping(DependencyConfig::default()));
    let fake = ScriptedOperation::<Vec<u8>>::always(Err(status(503)));
    let ctx = CallContext::new();

    for _ in 0..2 {
        let _: Vec<u8> = invoker.call(&ctx, DEP, "k", fake.operation()).await.unwrap();
    }
    assert_eq!(
        invoker.breakers().get(&DEP.into()).unwrap().state(),
        CircuitState::Open
    );

    let blocked = invoker
        .call_detailed::<Vec<u8>, _, _>(&ctx, DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 2);
    assert_eq!(
        blocked.source,
        ValueSource::Fallback {
            reason: FallbackReason::CircuitOpen,
            strategy: FallbackStrategy::EmptyDefault,
        }
    );
    assert_eq!(sink.snapshot(&DEP.into()).short_circuits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_exactly_one_trial() {
    let (invoker, _) = invoker_for(DEP, tripping(DependencyConfig::default()));
    let failing = ScriptedOperation::<u32>::always(Err(status(500)));
    let ctx = CallContext::new();

    for _ in 0..2 {
        let _: u32 = invoker.call(&ctx, DEP, "k", failing.operation()).await.unwrap();
    }
    tokio::time::advance(Duration::from_millis(1_001)).await;

    let slow = ScriptedOperation::always(Ok(9_u32)).with_delay(Duration::from_millis(20));
    let (first, second) = tokio::join!(
        invoker.call_detailed::<u32, _, _>(&ctx, DEP, "a", slow.operation()),
        invoker.call_detailed::<u32, _, _>(&ctx, DEP, "b", slow.operation()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(slow.calls(), 1);
    assert_eq!(first.value, 9);
    assert_eq!(
        second.source,
        ValueSource::Fallback {
            reason: FallbackReason::CircuitOpen,
            strategy: FallbackStrategy::EmptyDefault,
        }
    );
    assert_eq!(
        invoker.breakers().get(&DEP.into()).unwrap().state(),
        CircuitState::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_and_restarts_cool_down() {
    let (invoker, _) = invoker_for(DEP, tripping(DependencyConfig::default()));
    let failing = ScriptedOperation::<u32>::always(Err(status(502)));
    let ctx = CallContext::new();
    let breaker = || invoker.breakers().get(&DEP.into()).unwrap();

    for _ in 0..2 {
        let _: u32 = invoker.call(&ctx, DEP, "k", failing.operation()).await.unwrap();
    }
    tokio::time::advance(Duration::from_millis(1_001)).await;

    let _: u32 = invoker.call(&ctx, DEP, "k", failing.operation()).await.unwrap();
    assert_eq!(failing.calls(), 3);
    assert_eq!(breaker().state(), CircuitState::Open);

    // Past the original cool-down but not the restarted one
    tokio::time::advance(Duration::from_millis(500)).await;
    let _: u32 = invoker.call(&ctx, DEP, "k", failing.operation()).await.unwrap();
    assert_eq!(failing.calls(), 3);

    tokio::time::advance(Duration::from_millis(501)).await;
    let recovered = ScriptedOperation::always(Ok(1_u32));
    let value: u32 = invoker.call(&ctx, DEP, "k", recovered.operation()).await.unwrap();
    assert_eq!(value, 1);
    assert_eq!(breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_always_503_makes_three_attempts_then_falls_back() {
    let config = fast(DependencyConfig::default()).with_max_attempts(3);
    let (invoker, sink) = invoker_for(DEP, config);
    let fake = ScriptedOperation::<Vec<u32>>::always(Err(status(503)));

    let resolved = invoker
        .call_detailed(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 3);
    assert!(resolved.value.is_empty());
    assert_eq!(
        resolved.source,
        ValueSource::Fallback {
            reason: FallbackReason::RetriesExhausted(FailureKind::ServerError),
            strategy: FallbackStrategy::EmptyDefault,
        }
    );
    let counts = sink.snapshot(&DEP.into());
    assert_eq!(counts.calls, 3);
    assert_eq!(counts.failures, 3);
    assert_eq!(counts.fallbacks, 1);
}

#[tokio::test]
async fn test_long_exponential_retry_sequence_saturates_at_backoff_cap() {
    let config = fast(DependencyConfig::default())
        .without_cache()
        .with_max_attempts(100)
        .with_recording(RecordingMode::PerCall)
        .with_backoff(BackoffSettings::Exponential {
            base_ms: 1,
            max_ms: 2,
            multiplier: 2.0,
            jitter_factor: 0.0,
        });
    assert!(config.validate(DEP).is_ok());
    let (invoker, _) = invoker_for(DEP, config);
    let fake = ScriptedOperation::<Vec<u32>>::always(Err(status(503)));

    let resolved = invoker
        .call_detailed(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 100);
    assert!(resolved.is_fallback());
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()));
    let fake = ScriptedOperation::statuses_then(&[429, 503], 11_u32);

    let resolved = invoker
        .call_detailed(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(resolved.value, 11);
    assert_eq!(
        resolved.source,
        ValueSource::Live {
            attempts: 3,
            coalesced: false
        }
    );
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()));

    for code in [400_u16, 404, 422] {
        let fake = ScriptedOperation::<Vec<u8>>::always(Err(status(code)));
        let _: Vec<u8> = invoker
            .call(&CallContext::new(), DEP, code as u64, fake.operation())
            .await
            .unwrap();
        assert_eq!(fake.calls(), 1, "status {code} must not be retried");
    }
}

#[tokio::test]
async fn test_disabled_dependency_routes_to_fallback_without_io() {
    let (invoker, sink) = invoker_for(DEP, fast(DependencyConfig::default()).disabled());
    let fake = ScriptedOperation::always(Ok(vec![1_u8]));

    let resolved = invoker
        .call_detailed(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 0);
    assert!(resolved.is_fallback());
    assert_eq!(sink.snapshot(&DEP.into()).cache_misses, 0);
}

#[tokio::test]
async fn test_non_degradable_failure_names_the_dependency() {
    let config = fast(DependencyConfig::for_media_manager()).with_max_attempts(2);
    let (invoker, _) = invoker_for("media-manager", config);
    let fake = ScriptedOperation::<String>::always(Err(status(500)));

    let err = invoker
        .call(&CallContext::new(), "media-manager", "upload-1", fake.operation())
        .await
        .unwrap_err();

    assert_eq!(err.dependency.as_str(), "media-manager");
    assert_eq!(err.reason, FallbackReason::RetriesExhausted(FailureKind::ServerError));
    assert!(err.to_string().contains("media-manager"));

    let wrapped = ResilienceError::from(err);
    assert_eq!(wrapped.dependency(), Some("media-manager"));
}

#[tokio::test]
async fn test_client_error_that_trips_the_breaker_stays_non_retryable() {
    let config = fast(DependencyConfig::for_media_manager())
        .with_max_attempts(3)
        .with_minimum_calls(1)
        .with_failure_rate_threshold(0.5);
    let (invoker, _) = invoker_for("media-manager", config);
    let fake = ScriptedOperation::<String>::always(Err(status(404)));

    let err = invoker
        .call(&CallContext::new(), "media-manager", "upload-2", fake.operation())
        .await
        .unwrap_err();

    assert_eq!(fake.calls(), 1);
    assert_eq!(err.reason, FallbackReason::NonRetryable(FailureKind::ClientError));
    assert_eq!(err.status_code, Some(404));
    assert!(!err.retryable);
    assert_eq!(
        invoker.breakers().get(&"media-manager".into()).unwrap().state(),
        CircuitState::Open
    );
}

#[tokio::test]
async fn test_concurrent_misses_coalesce_into_one_call() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()));
    let fake = ScriptedOperation::always(Ok(3_u32)).with_delay(Duration::from_millis(40));
    let ctx = CallContext::new();

    let calls = (0..5).map(|_| invoker.call::<u32, _, _>(&ctx, DEP, "hot", fake.operation()));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.as_ref().ok() == Some(&3)));
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn test_coalescing_can_be_disabled() {
    let config = ResilienceConfig {
        coalesce_in_flight: false,
        ..ResilienceConfig::empty()
    }
    .with_dependency(DEP, fast(DependencyConfig::default()));
    let invoker = ResilientInvoker::new(config).unwrap();
    let fake = ScriptedOperation::always(Ok(3_u32)).with_delay(Duration::from_millis(40));
    let ctx = CallContext::new();

    let calls = (0..3).map(|_| invoker.call::<u32, _, _>(&ctx, DEP, "hot", fake.operation()));
    futures::future::join_all(calls).await;

    assert_eq!(fake.calls(), 3);
}

#[tokio::test]
async fn test_timeout_is_classified_and_retried() {
    let config = DependencyConfig::default()
        .with_fixed_backoff(Duration::from_millis(1))
        .with_timeouts(Duration::from_millis(20), Duration::from_millis(20))
        .with_max_attempts(2);
    let (invoker, sink) = invoker_for(DEP, config);
    let fake = ScriptedOperation::always(Ok(1_u32)).with_delay(Duration::from_secs(2));

    let resolved = invoker
        .call_detailed(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 2);
    assert_eq!(
        resolved.source,
        ValueSource::Fallback {
            reason: FallbackReason::RetriesExhausted(FailureKind::Timeout),
            strategy: FallbackStrategy::EmptyDefault,
        }
    );
    assert_eq!(sink.snapshot(&DEP.into()).timeouts, 2);
}

#[tokio::test]
async fn test_transport_timeout_error_is_retryable() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()));
    let fake = ScriptedOperation::new(vec![Err(TransportError::Timeout), Ok(5_u32)]);

    let value: u32 = invoker
        .call(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(value, 5);
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn test_per_call_recording_counts_one_window_entry() {
    let config = fast(DependencyConfig::default()).with_recording(RecordingMode::PerCall);
    let (invoker, _) = invoker_for(DEP, config);
    let fake = ScriptedOperation::<Vec<u8>>::always(Err(status(503)));

    let _: Vec<u8> = invoker
        .call(&CallContext::new(), DEP, "k", fake.operation())
        .await
        .unwrap();

    assert_eq!(fake.calls(), 3);
    let snapshot = invoker.breakers().get(&DEP.into()).unwrap().snapshot();
    assert_eq!(snapshot.window_len, 1);
}

#[tokio::test]
async fn test_cancelled_background_call_reports_cancellation() {
    let config = DependencyConfig::default().with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
    let (invoker, _) = invoker_for(DEP, config);
    let fake = ScriptedOperation::always(Ok(1_u32)).with_delay(Duration::from_millis(500));

    let handle = invoker.spawn_call(CallContext::new(), DEP, "k", fake.operation());
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let result = handle.await;
    assert!(matches!(result, Err(ResilienceError::Cancelled)));
    assert_eq!(invoker.cache().stats(&DEP.into()).entries, 0);
}

#[tokio::test]
async fn test_background_call_completes() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()));
    let fake = ScriptedOperation::always(Ok(8_u32));

    let handle = invoker.spawn_call(CallContext::new(), DEP, "k", fake.operation());

    assert_eq!(handle.await.unwrap(), 8);
}

#[tokio::test]
async fn test_health_snapshot_reflects_open_circuit() {
    let (invoker, _) = invoker_for(DEP, tripping(DependencyConfig::default()));
    let fake = ScriptedOperation::<u32>::always(Err(status(503)));
    let ctx = CallContext::new();

    for _ in 0..2 {
        let _: u32 = invoker.call(&ctx, DEP, "k", fake.operation()).await.unwrap();
    }

    let report = invoker.health();
    let health = report.get(DEP).unwrap();
    assert_eq!(health.state, CircuitState::Open);
    assert!(health.last_latency_ms.is_some());
    assert!(!report.is_healthy());
    assert_eq!(report.open_circuits().len(), 1);
}

#[tokio::test]
async fn test_runtime_config_swap_takes_effect_on_next_call() {
    let (invoker, _) = invoker_for(DEP, fast(DependencyConfig::default()).without_cache());
    let fake = ScriptedOperation::<Vec<u8>>::always(Err(status(503)));
    let ctx = CallContext::new();

    invoker
        .registry()
        .upsert(
            &DEP.into(),
            fast(DependencyConfig::default()).without_cache().with_max_attempts(1),
        )
        .unwrap();
    let _: Vec<u8> = invoker.call(&ctx, DEP, "k", fake.operation()).await.unwrap();

    assert_eq!(fake.calls(), 1);
}
