//! Configuration check command handler.

use std::collections::BTreeMap;
use std::path::Path;

use tollgate::ModelLimits;

use super::{OutputFormat, load_config};

/// Handle `tollgate check`.
pub fn handle_check(
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;

    let mut effective: BTreeMap<&str, BTreeMap<&str, ModelLimits>> = BTreeMap::new();
    for (upstream, upstream_config) in &config.upstreams {
        let models = effective.entry(upstream.as_str()).or_default();
        for model in upstream_config.models.keys() {
            if let Some(limits) = config.limits_for(upstream, model) {
                models.insert(model.as_str(), limits);
            }
        }
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        OutputFormat::Human => {
            if effective.is_empty() {
                println!("Configuration is valid; no upstreams configured.");
                return Ok(());
            }
            for (upstream, models) in &effective {
                let cap = config.upstreams[*upstream].max_concurrency;
                println!("Upstream '{}' (max_concurrency: {})", upstream, limit(cap));
                println!("{:-<80}", "");
                for (model, limits) in models {
                    println!(
                        "  {:<32} rpm={} tpm={} rpd={} tpd={} max_concurrency={} timezone={}",
                        model,
                        limit(limits.rpm),
                        limit(limits.tpm),
                        limit(limits.rpd),
                        limit(limits.tpd),
                        limit(limits.max_concurrency),
                        limits.timezone.as_deref().unwrap_or("UTC"),
                    );
                }
                println!();
            }
            println!("Configuration is valid.");
        }
    }

    Ok(())
}

fn limit(value: Option<i64>) -> String {
    match value {
        Some(n) if n > 0 => n.to_string(),
        _ => "unlimited".to_string(),
    }
}
