use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use outreach_cli::commands::{batch, clear, doctor, migrate, quarantine, queue, stage};
use outreach_core::domain::lead::Lead;
use outreach_core::store::LeadStore;
use outreach_db::{connect, migrations, SqlLeadRepository};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_credentials() {
    with_env(&[("OUTREACH_DATABASE_URL", "sqlite::memory:".to_string())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn queue_reports_empty_database() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        let result = queue::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "queue");
        assert_eq!(payload["data"]["total"], 0);
        assert_eq!(payload["data"]["quarantined"], 0);
    });
}

#[test]
fn research_reports_unknown_lead() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        let result = stage::research("nobody@acme.test");
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "research");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn send_rejects_out_of_range_step_before_touching_the_database() {
    with_env(&[], || {
        let result = stage::send("jane@acme.test", 4);
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "usage");
    });
}

#[test]
fn batch_rejects_unknown_stage() {
    with_env(&[], || {
        let result = batch::run("booking", None);
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "usage");
    });
}

#[test]
fn batch_research_on_empty_queue_is_a_clean_noop() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        let result = batch::run("research", Some(3));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["successful"], 0);
        assert_eq!(payload["data"]["failed"], 0);
    });
}

#[test]
fn clear_resets_quarantined_lead() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        seed_quarantined_lead(dir.path(), "stuck@acme.test");

        let listed = parse_payload(&quarantine::run(10).output);
        assert_eq!(listed["data"]["leads"][0]["email"], "stuck@acme.test");
        assert_eq!(listed["data"]["leads"][0]["quarantined"], true);

        let result = clear::run("stuck@acme.test", Some("scraped"));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["status"], "scraped");

        let relisted = parse_payload(&quarantine::run(10).output);
        assert_eq!(relisted["data"]["leads"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn clear_rejects_unknown_status() {
    with_env(&[], || {
        let result = clear::run("stuck@acme.test", Some("limbo"));
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "usage");
    });
}

#[test]
fn doctor_passes_with_warning_when_only_logging_notifications() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&valid_env(dir.path()), || {
        let (passed, output) = doctor::run(true);
        assert!(passed, "doctor output: {output}");

        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "warn");
        let channel = payload["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "operator_channel"))
            .cloned()
            .unwrap_or_default();
        assert_eq!(channel["status"], "warn");
    });
}

#[test]
fn doctor_fails_and_skips_dependent_checks_on_invalid_config() {
    with_env(&[], || {
        let (passed, output) = doctor::run(true);
        assert!(!passed);

        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

fn seed_quarantined_lead(dir: &Path, email: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect(&database_url(dir)).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let mut lead = Lead::discovered(email, "Stuck Lead", Utc::now());
        lead.error_count = 5;
        lead.last_error = Some("research failed: timeout".to_string());
        lead.last_error_at = Some(Utc::now());
        let repository = SqlLeadRepository::new(pool.clone());
        assert!(repository.insert_if_absent(&lead).await.expect("insert"));
        pool.close().await;
    });
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("outreach.db").display())
}

fn valid_env(dir: &Path) -> Vec<(&'static str, String)> {
    vec![
        ("OUTREACH_DATABASE_URL", database_url(dir)),
        ("OUTREACH_MAIL_API_KEY", "re_test_key".to_string()),
        ("OUTREACH_MAIL_SENDERS", "sdr@seller.test".to_string()),
        ("OUTREACH_SCRAPER_API_TOKEN", "apify_test_token".to_string()),
    ]
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "OUTREACH_DATABASE_URL",
        "OUTREACH_DATABASE_MAX_CONNECTIONS",
        "OUTREACH_DATABASE_TIMEOUT_SECS",
        "OUTREACH_LLM_PROVIDER",
        "OUTREACH_LLM_API_KEY",
        "OUTREACH_LLM_BASE_URL",
        "OUTREACH_LLM_MODEL",
        "OUTREACH_MAIL_API_KEY",
        "OUTREACH_MAIL_BASE_URL",
        "OUTREACH_MAIL_SENDERS",
        "OUTREACH_SCRAPER_API_TOKEN",
        "OUTREACH_SLACK_WEBHOOK_URL",
        "OUTREACH_PIPELINE_QUARANTINE_THRESHOLD",
        "OUTREACH_SERVER_PORT",
        "OUTREACH_LOGGING_LEVEL",
        "OUTREACH_LOG_LEVEL",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
