//! `safe-sentinel doctor` - active health diagnostics.
//!
//! Validates configuration and probes every backend so a broken endpoint
//! shows up before a review, not in the middle of one.

use std::time::Duration;

use crate::config::Config;
use crate::settings::Settings;

/// Run diagnostic checks and print results.
pub async fn run_doctor_command() -> anyhow::Result<()> {
    println!("safe-sentinel doctor");
    println!("====================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    check(
        "Settings file",
        check_settings_file(),
        &mut passed,
        &mut failed,
    );

    let config = match Config::build(&Settings::load()) {
        Ok(config) => {
            check(
                "Configuration",
                CheckResult::Pass("all values valid".to_string()),
                &mut passed,
                &mut failed,
            );
            config
        }
        Err(e) => {
            check(
                "Configuration",
                CheckResult::Fail(e.to_string()),
                &mut passed,
                &mut failed,
            );
            summary(passed, failed);
            anyhow::bail!("configuration is invalid");
        }
    };

    check(
        "Etherscan API key",
        if config.etherscan.api_key.is_some() {
            CheckResult::Pass("set".to_string())
        } else {
            CheckResult::Skip("ETHERSCAN_API_KEY not set; contract lookups may be rate limited".to_string())
        },
        &mut passed,
        &mut failed,
    );

    let timeout = config.http_timeout.min(Duration::from_secs(10));
    let probes = [
        ("Transaction registry", format!("{}/about/", config.registry.base_url)),
        ("Analyzer backend", config.analyzer.base_url.clone()),
        ("Signing backend", config.signer.base_url.clone()),
        ("Etherscan API", config.etherscan.api_url.clone()),
    ];
    for (label, endpoint) in probes {
        check(
            label,
            probe_http_endpoint(label, &endpoint, timeout).await,
            &mut passed,
            &mut failed,
        );
    }

    summary(passed, failed);
    if failed > 0 {
        anyhow::bail!("{failed} check(s) failed");
    }
    Ok(())
}

fn summary(passed: u32, failed: u32) {
    println!();
    println!("{passed} passed, {failed} failed");
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

#[derive(Debug)]
enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_settings_file() -> CheckResult {
    let path = Settings::default_path();
    match std::fs::read_to_string(&path) {
        Ok(data) => match serde_json::from_str::<Settings>(&data) {
            Ok(_) => CheckResult::Pass(path.display().to_string()),
            Err(e) => CheckResult::Fail(format!("{} is not valid JSON: {e}", path.display())),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::Skip(format!("{} not present, using defaults", path.display()))
        }
        Err(e) => CheckResult::Fail(format!("cannot read {}: {e}", path.display())),
    }
}

async fn probe_http_endpoint(label: &str, endpoint: &str, timeout: Duration) -> CheckResult {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return CheckResult::Fail(format!("{label} endpoint is empty"));
    }

    let url = match reqwest::Url::parse(endpoint) {
        Ok(url) => url,
        Err(e) => {
            return CheckResult::Fail(format!(
                "{label} endpoint URL is invalid ({}): {e}",
                redact_url_for_display(endpoint)
            ));
        }
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return CheckResult::Fail(format!("cannot construct HTTP client: {e}")),
    };

    match client.get(url.clone()).send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_server_error() {
                CheckResult::Fail(format!(
                    "{label} reachable but unhealthy ({} at {})",
                    status,
                    redact_url_for_display(url.as_str())
                ))
            } else {
                CheckResult::Pass(format!(
                    "{} ({status})",
                    redact_url_for_display(url.as_str())
                ))
            }
        }
        Err(e) => CheckResult::Fail(format!(
            "{label} unreachable ({}): {e}",
            redact_url_for_display(url.as_str())
        )),
    }
}

fn redact_url_for_display(raw: &str) -> String {
    match reqwest::Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() {
                let _ = url.set_username("redacted");
            }
            if url.password().is_some() {
                let _ = url.set_password(Some("redacted"));
            }
            url.to_string()
        }
        Err(_) => "<invalid-url>".to_string(),
    }
}
