use outreach_core::config::AppConfig;
use outreach_db::ping;
use serde::Serialize;

use crate::commands::session::{connect_and_migrate, current_thread_runtime, load_config};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.overall_status != CheckStatus::Fail
    }
}

pub fn run(json_output: bool) -> (bool, String) {
    let report = build_report();
    let passed = report.passed();

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
        return (passed, output);
    }

    (passed, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config("doctor") {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_senders(&config));
            checks.push(check_notifier(&config));
            checks.push(check_database(&config));
        }
        Err(result) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: failure_message(&result.output),
            });
            for name in ["sender_rotation", "operator_channel", "database"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_senders(config: &AppConfig) -> DoctorCheck {
    let count = config.mail.senders.len();
    let status = if count > 1 { CheckStatus::Pass } else { CheckStatus::Warn };
    DoctorCheck {
        name: "sender_rotation",
        status,
        details: format!("{count} sender identities configured"),
    }
}

fn check_notifier(config: &AppConfig) -> DoctorCheck {
    match config.slack.webhook_url {
        Some(_) => DoctorCheck {
            name: "operator_channel",
            status: CheckStatus::Pass,
            details: "slack incoming webhook configured".to_string(),
        },
        None => DoctorCheck {
            name: "operator_channel",
            status: CheckStatus::Warn,
            details: "no slack webhook; notifications will only be logged".to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(result) => {
            return DoctorCheck {
                name: "database",
                status: CheckStatus::Fail,
                details: failure_message(&result.output),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate("doctor", config).await.map_err(|result| failure_message(&result.output))?;
        let pinged = ping(&pool).await.map_err(|error| format!("ping failed: {error}"));
        pool.close().await;
        pinged
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database",
            status: CheckStatus::Pass,
            details: format!("connected and migrated `{}`", config.database.url),
        },
        Err(details) => DoctorCheck { name: "database", status: CheckStatus::Fail, details },
    }
}

fn failure_message(output: &str) -> String {
    serde_json::from_str::<serde_json::Value>(output)
        .ok()
        .and_then(|payload| payload["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| output.to_string())
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
