use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use classhub::identity::{HttpTokenVerifier, IdentityResolver, MemoryGateway, TeacherAllowlist};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port: u16 = std::env::var("CLASSHUB_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    let verifier_url = std::env::var("CLASSHUB_VERIFIER_URL")
        .unwrap_or_else(|_| "http://localhost:9099".to_string());
    let verifier_timeout_ms: u64 = std::env::var("CLASSHUB_VERIFIER_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    let allowlist =
        TeacherAllowlist::from_csv(&std::env::var("CLASSHUB_TEACHER_EMAILS").unwrap_or_default());
    info!(
        target: "classhub",
        "classhub starting: RUST_LOG='{}', http_port={}, verifier_url='{}', verifier_timeout_ms={}, teacher_allowlist_entries={}",
        rust_log, http_port, verifier_url, verifier_timeout_ms, allowlist.len()
    );

    let verifier = HttpTokenVerifier::new(&verifier_url, Duration::from_millis(verifier_timeout_ms))?;
    let resolver = IdentityResolver::new(
        Arc::new(verifier),
        Arc::new(MemoryGateway::new()),
        allowlist,
    );
    classhub::server::run_with_port(http_port, Arc::new(resolver)).await
}
