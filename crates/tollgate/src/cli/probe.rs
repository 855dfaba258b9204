//! Candidate probe command handler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tollgate::{
    AdmissionError, AdmissionErrorKind, CandidatePool, INF_DURATION, SystemClock,
};

use super::load_config;

/// Handle `tollgate probe`.
pub async fn handle_probe(
    path: Option<&Path>,
    model: &str,
    tokens: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let pool = CandidatePool::from_config(&config, Arc::new(SystemClock))?;

    let candidates = pool.candidates(model);
    if candidates.is_empty() {
        return Err(AdmissionError::new(AdmissionErrorKind::NoUpstreamAvailable(
            model.to_string(),
        ))
        .into());
    }

    println!("Candidates for '{}' ({} tokens):", model, tokens);
    println!("{:-<80}", "");
    for candidate in candidates {
        println!(
            "  {:<24} saturated={:<5} wait={}",
            candidate.upstream(),
            candidate.is_saturated(),
            format_wait(candidate.limiter().probe(tokens)),
        );
    }

    Ok(())
}

fn format_wait(wait: Duration) -> String {
    if wait == INF_DURATION {
        "never (exceeds a hard limit)".to_string()
    } else {
        format!("{:.3}s", wait.as_secs_f64())
    }
}
