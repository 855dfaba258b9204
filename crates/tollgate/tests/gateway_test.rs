//! End-to-end admission tests through the facade crate.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::Builder;
use tollgate::{
    AdmissionErrorKind, CandidatePool, GatewayConfig, ManualClock, Reservation, TokenReservation,
    WaitContext, WallClock,
};

const CONFIG: &str = r#"
[defaults]
timezone = "UTC"

[upstreams.openai]
max_concurrency = 1

[upstreams.openai.models."gpt-4o-mini"]
rpm = 60
tpm = 10_000
rpd = 2

[upstreams.azure.models."gpt-4o-mini"]
tpm = 1_000
max_concurrency = 1
"#;

fn pool() -> CandidatePool {
    let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(temp_file, "{}", CONFIG).unwrap();
    let config = GatewayConfig::from_file(temp_file.path()).unwrap();

    let clock: Arc<dyn WallClock> = Arc::new(ManualClock::new(
        chrono::DateTime::parse_from_rfc3339("2025-05-01T10:00:00Z")
            .unwrap()
            .to_utc(),
    ));
    CandidatePool::from_config(&config, clock).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_elect_admit_complete() {
    let pool = pool();
    let ctx = WaitContext::with_timeout(Duration::from_secs(5));

    let elected = pool.elect("gpt-4o-mini", &ctx).await.unwrap();
    let mut admission = elected.admit(800, &ctx).await.unwrap();
    assert!(admission.is_acquired());
    admission.complete_with_actual(650);
    assert!(!admission.is_acquired());

    elected.release();
}

#[tokio::test(start_paused = true)]
async fn test_both_upstreams_busy_times_out() {
    let pool = pool();
    let ctx = WaitContext::with_timeout(Duration::from_secs(5));

    let first = pool.elect("gpt-4o-mini", &ctx).await.unwrap();
    let second = pool.elect("gpt-4o-mini", &ctx).await.unwrap();
    assert_ne!(first.upstream(), second.upstream());

    let err = pool.elect("gpt-4o-mini", &ctx).await.unwrap_err();
    assert_eq!(err.kind(), &AdmissionErrorKind::WaitTimedOut);

    drop(first);
    let third = pool
        .elect("gpt-4o-mini", &WaitContext::background())
        .await
        .unwrap();
    assert!(!third.waited());
}

#[tokio::test(start_paused = true)]
async fn test_request_too_large_for_one_upstream() {
    let pool = pool();
    let azure = pool
        .candidates("gpt-4o-mini")
        .iter()
        .find(|c| c.upstream() == "azure")
        .unwrap();
    let openai = pool
        .candidates("gpt-4o-mini")
        .iter()
        .find(|c| c.upstream() == "openai")
        .unwrap();

    let Err(err) = azure.limiter().reserve(5_000) else {
        panic!("azure accepted more tokens than its TPM burst");
    };
    assert!(!err.is_retryable());
    assert!(openai.limiter().reserve(5_000).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_daily_quota_blocks_until_deadline() {
    let pool = pool();
    let openai = pool
        .candidates("gpt-4o-mini")
        .iter()
        .find(|c| c.upstream() == "openai")
        .unwrap();
    let limiter = openai.limiter();

    for _ in 0..2 {
        let mut admission = limiter.admit(10, &WaitContext::background()).await.unwrap();
        admission.complete();
    }

    let ctx = WaitContext::with_timeout(Duration::from_secs(3));
    let err = limiter.admit(10, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), &AdmissionErrorKind::WaitTimedOut);
    assert_eq!(limiter.probe(10), Duration::from_secs(14 * 3600));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_model_is_routing_failure() {
    let pool = pool();
    let err = pool
        .elect("claude-unknown", &WaitContext::background())
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        AdmissionErrorKind::NoUpstreamAvailable(_)
    ));
}
