//! Tests for the gateway configuration system.

use std::io::Write;

use tempfile::{Builder, NamedTempFile};
use tollgate_error::TollgateErrorKind;
use tollgate_rate_limit::{GatewayConfig, MAX_CONCURRENCY, ModelLimits, UpstreamConfig};

fn config_file(contents: &str) -> NamedTempFile {
    let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(temp_file, "{}", contents).unwrap();
    temp_file
}

const TWO_UPSTREAMS: &str = r#"
[defaults]
timezone = "UTC"
rpd = 5_000

[upstreams.openai]
max_concurrency = 16

[upstreams.openai.defaults]
rpm = 500

[upstreams.openai.models."gpt-4o-mini"]
tpm = 200_000
max_concurrency = 4

[upstreams.openai.models."text-embedding-3-small"]
rpm = 3_000

[upstreams.azure.models."gpt-4o-mini"]
rpm = 60
tpd = 1_000_000
timezone = "America/New_York"
"#;

#[test]
fn test_load_bundled_defaults() {
    let config = GatewayConfig::load().unwrap();
    assert_eq!(config.defaults.timezone.as_deref(), Some("UTC"));
    assert_eq!(config.defaults.location().unwrap(), chrono_tz::UTC);
}

#[test]
fn test_config_from_file() {
    let temp_file = config_file(TWO_UPSTREAMS);
    let config = GatewayConfig::from_file(temp_file.path()).unwrap();

    assert_eq!(config.upstreams.len(), 2);
    assert_eq!(config.upstreams["openai"].max_concurrency, Some(16));
    assert_eq!(config.upstreams["azure"].max_concurrency, None);
}

#[test]
fn test_limits_cascade_from_defaults() {
    let temp_file = config_file(TWO_UPSTREAMS);
    let config = GatewayConfig::from_file(temp_file.path()).unwrap();

    let openai = config.limits_for("openai", "gpt-4o-mini").unwrap();
    assert_eq!(
        openai,
        ModelLimits {
            rpm: Some(500),
            tpm: Some(200_000),
            rpd: Some(5_000),
            tpd: None,
            max_concurrency: Some(4),
            timezone: Some("UTC".to_string()),
        }
    );

    let embedding = config
        .limits_for("openai", "text-embedding-3-small")
        .unwrap();
    assert_eq!(embedding.rpm, Some(3_000));

    let azure = config.limits_for("azure", "gpt-4o-mini").unwrap();
    assert_eq!(azure.rpm, Some(60));
    assert_eq!(azure.tpd, Some(1_000_000));
    assert_eq!(azure.location().unwrap(), chrono_tz::America::New_York);

    assert!(config.limits_for("azure", "text-embedding-3-small").is_none());
    assert!(config.limits_for("anthropic", "gpt-4o-mini").is_none());
}

#[test]
fn test_models_and_upstreams() {
    let temp_file = config_file(TWO_UPSTREAMS);
    let config = GatewayConfig::from_file(temp_file.path()).unwrap();

    let models: Vec<_> = config.models().into_iter().collect();
    assert_eq!(models, vec!["gpt-4o-mini", "text-embedding-3-small"]);

    let upstreams: Vec<_> = config.upstreams_for("gpt-4o-mini").collect();
    assert_eq!(upstreams, vec!["azure", "openai"]);
    assert_eq!(config.upstreams_for("unknown").count(), 0);
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let temp_file = config_file(
        r#"
[upstreams.local.models."llama3"]
rpd = 100
timezone = "Mars/Olympus_Mons"
"#,
    );

    let err = GatewayConfig::from_file(temp_file.path()).unwrap_err();
    match err.kind() {
        TollgateErrorKind::Config(e) => {
            assert!(e.message.contains("local/llama3"), "{}", e.message);
            assert!(e.message.contains("Mars/Olympus_Mons"), "{}", e.message);
        }
        other => panic!("expected configuration error, got {other}"),
    }
}

#[test]
fn test_oversized_concurrency_is_rejected() {
    let temp_file = config_file(
        r#"
[upstreams.local]
max_concurrency = 9223372036854775807

[upstreams.local.models."llama3"]
rpm = 60
"#,
    );

    let err = GatewayConfig::from_file(temp_file.path()).unwrap_err();
    match err.kind() {
        TollgateErrorKind::Config(e) => {
            assert!(e.message.contains("local"), "{}", e.message);
            assert!(e.message.contains("max_concurrency"), "{}", e.message);
        }
        other => panic!("expected configuration error, got {other}"),
    }

    let mut config = GatewayConfig::default();
    config.upstreams.insert(
        "local".to_string(),
        UpstreamConfig {
            models: [(
                "llama3".to_string(),
                ModelLimits {
                    max_concurrency: Some(MAX_CONCURRENCY as i64 + 1),
                    ..Default::default()
                },
            )]
            .into(),
            ..Default::default()
        },
    );
    let err = config.validate().unwrap_err();
    assert!(err.message.contains("local/llama3"), "{}", err.message);

    let limits = config
        .upstreams
        .get_mut("local")
        .and_then(|upstream| upstream.models.get_mut("llama3"))
        .unwrap();
    limits.max_concurrency = Some(MAX_CONCURRENCY as i64);
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_file_is_rejected() {
    let temp_file = config_file("[upstreams.openai\nrpm = ");
    let err = GatewayConfig::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err.kind(), TollgateErrorKind::Config(_)));
}

#[test]
fn test_missing_file_is_rejected() {
    assert!(GatewayConfig::from_file("/nonexistent/tollgate.toml").is_err());
}

#[test]
fn test_merged_over_prefers_own_values() {
    let defaults = ModelLimits {
        rpm: Some(10),
        tpm: Some(1_000),
        timezone: Some("Asia/Shanghai".to_string()),
        ..Default::default()
    };
    let own = ModelLimits {
        rpm: Some(-1),
        ..Default::default()
    };

    let merged = own.merged_over(&defaults);
    assert_eq!(merged.rpm, Some(-1));
    assert_eq!(merged.tpm, Some(1_000));
    assert_eq!(merged.location().unwrap(), chrono_tz::Asia::Shanghai);
}

#[test]
fn test_empty_upstream_config_defaults() {
    let upstream = UpstreamConfig::default();
    assert!(upstream.max_concurrency.is_none());
    assert!(upstream.models.is_empty());
    assert_eq!(upstream.defaults, ModelLimits::default());
}
