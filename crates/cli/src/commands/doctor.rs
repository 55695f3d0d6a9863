use reune_core::config::{AppConfig, LlmProvider, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{block_on, open_database};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
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
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_readiness", "database_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Credentials are never contacted here; this only checks that a call could be attempted.
fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let has_key =
        llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
    let has_base_url = llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty());

    let (status, details) = match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Groq if !has_key => {
            (CheckStatus::Fail, format!("{:?} requires llm.api_key", llm.provider))
        }
        LlmProvider::Ollama if !has_base_url => {
            (CheckStatus::Fail, "ollama requires llm.base_url".to_string())
        }
        provider => (
            CheckStatus::Pass,
            format!("{provider:?} model `{}` with {}s timeout", llm.model, llm.timeout_secs),
        ),
    };
    DoctorCheck { name: "llm_readiness", status, details }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let result = block_on("doctor", async {
        let pool = open_database(config).await?;
        pool.close().await;
        Ok::<(), crate::commands::Failure>(())
    });

    match result {
        Ok(Ok(())) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("connected and migrated `{}`", config.database.url),
        },
        Ok(Err((error_class, message, _))) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!("{error_class}: {message}"),
        },
        Err(_) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: "failed to initialize async runtime".to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
