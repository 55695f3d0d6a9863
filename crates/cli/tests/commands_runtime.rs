use std::env;
use std::sync::{Mutex, OnceLock};

use reune_cli::commands::{classify, clear, config, doctor, migrate, plan, split};
use reune_core::domain::conversation::UserId;
use reune_core::domain::event::{
    EventId, InviteStatus, Item, ItemId, ItemPriority, NewEvent, Participant, ParticipantId,
};
use reune_db::repositories::{EventPlanRepository, SqlEventPlanRepository};
use reune_db::{connect_with_settings, migrations};
use serde_json::Value;

const MEMORY_DB: &[(&str, &str)] =
    &[("REUNE_DATABASE_URL", "sqlite::memory:"), ("REUNE_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
    });
}

#[test]
fn migrate_returns_config_failure_for_keyless_provider() {
    with_env(&[("REUNE_LLM_PROVIDER", "groq")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn classify_reports_intent_and_slots() {
    let result = classify::run("quero um churrasco para 12 pessoas");
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "classify");
    let report = parse_payload(payload["message"].as_str().expect("message string"));
    assert_eq!(report["intent"], "create_event");
    assert_eq!(report["slots"]["tipo_evento"], "churrasco");
    assert_eq!(report["slots"]["qtd_pessoas"], 12);
    assert_eq!(report["complete"], true);

    let empty = classify::run("   ");
    assert_eq!(empty.exit_code, 2);
    assert_eq!(parse_payload(&empty.output)["error_class"], "invalid_params");
}

#[test]
fn plan_rejects_non_numeric_event_ids() {
    with_env(MEMORY_DB, || {
        let result = plan::run("abc");
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_params");
    });
}

#[test]
fn split_and_plan_report_missing_events() {
    with_env(MEMORY_DB, || {
        let split = split::run("41");
        assert_eq!(split.exit_code, 6);
        assert_eq!(parse_payload(&split.output)["error_class"], "not_found");

        let plan = plan::run("41");
        assert_eq!(plan.exit_code, 6);
        assert_eq!(parse_payload(&plan.output)["command"], "plan");
    });
}

#[test]
fn split_persists_distribution_for_seeded_event() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("reune.db").display());
    let event_id = seed_event(&url);

    with_env(&[("REUNE_DATABASE_URL", &url)], || {
        let split = split::run(event_id.as_str());
        assert_eq!(split.exit_code, 0, "split failed: {}", split.output);
        let data = parse_payload(
            parse_payload(&split.output)["message"].as_str().expect("message string"),
        );
        assert_eq!(data["resumo"]["valor_total"], 120.0);
        assert_eq!(data["distribuicao"].as_array().map(Vec::len), Some(2));

        let plan = plan::run(event_id.as_str());
        assert_eq!(plan.exit_code, 0, "plan failed: {}", plan.output);
        let data =
            parse_payload(parse_payload(&plan.output)["message"].as_str().expect("message"));
        assert_eq!(data["evento"]["status"], "distribuicao_pronta");
        assert_eq!(data["resumo"]["por_participante"][0]["valor_total"], 60.0);
    });
}

#[test]
fn clear_succeeds_for_unknown_user() {
    with_env(MEMORY_DB, || {
        let result = clear::run("u-nobody");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "clear");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("context_removed=false"));
        assert!(message.contains("messages_removed=0"));

        let blank = clear::run(" ");
        assert_eq!(blank.exit_code, 2);
    });
}

#[test]
fn doctor_json_passes_with_memory_database() {
    with_env(MEMORY_DB, || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass");

        let names = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| check["name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["config_validation", "llm_readiness", "database_schema"]);
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[("REUNE_LLM_PROVIDER", "openai")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");

        let human = doctor::run(false);
        assert!(human.starts_with("doctor: one or more readiness checks failed"));
        assert!(last_line(&human).contains("[skip] database_schema"));
    });
}

#[test]
fn config_reports_sources_and_redacts_api_key() {
    with_env(
        &[
            ("REUNE_DATABASE_URL", "sqlite::memory:"),
            ("REUNE_LLM_PROVIDER", "groq"),
            ("REUNE_LLM_API_KEY", "gsk-very-secret-value"),
        ],
        || {
            let output = config::run();
            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (REUNE_DATABASE_URL))"
            ));
            assert!(output.contains("- llm.api_key = gsk-*** (source: env (REUNE_LLM_API_KEY))"));
            assert!(output.contains("- gateway.redact_pii = true (source: default)"));
            assert!(!output.contains("very-secret"));
        },
    );
}

fn seed_event(url: &str) -> EventId {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repo = SqlEventPlanRepository::new(pool.clone());

        let event = repo
            .create_event(NewEvent {
                owner_id: UserId("u-owner".to_string()),
                name: "pizza da firma".to_string(),
                event_type: "pizza".to_string(),
                people_count: 2,
                date: None,
            })
            .await
            .expect("create event");
        repo.replace_items(
            &event.id,
            vec![Item {
                id: ItemId("item-1".to_string()),
                event_id: event.id.clone(),
                name: "Pizza grande".to_string(),
                quantity: 3.0,
                unit: "un".to_string(),
                estimated_value: 120.0,
                category: "comida".to_string(),
                priority: ItemPriority::A,
            }],
        )
        .await
        .expect("items");
        repo.add_participants(
            &event.id,
            ["Ana", "Bia"]
                .into_iter()
                .enumerate()
                .map(|(index, name)| Participant {
                    id: ParticipantId(format!("p-{index}")),
                    event_id: event.id.clone(),
                    name: name.to_string(),
                    contact: None,
                    invite_status: InviteStatus::Confirmado,
                    preferences: None,
                    amount_due: None,
                })
                .collect(),
        )
        .await
        .expect("participants");
        pool.close().await;
        event.id
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REUNE_DATABASE_URL",
        "REUNE_DATABASE_MAX_CONNECTIONS",
        "REUNE_DATABASE_TIMEOUT_SECS",
        "REUNE_LLM_PROVIDER",
        "REUNE_LLM_API_KEY",
        "REUNE_LLM_BASE_URL",
        "REUNE_LLM_MODEL",
        "REUNE_LLM_TEMPERATURE",
        "REUNE_LLM_TIMEOUT_SECS",
        "REUNE_GATEWAY_RATE_LIMIT_PER_WINDOW",
        "REUNE_GATEWAY_RATE_LIMIT_WINDOW_MS",
        "REUNE_GATEWAY_IDEMPOTENCY_TTL_MS",
        "REUNE_GATEWAY_REDACT_PII",
        "REUNE_CONVERSATION_HISTORY_LIMIT",
        "REUNE_CONVERSATION_RECENT_MESSAGES",
        "REUNE_LOGGING_LEVEL",
        "REUNE_LOGGING_FORMAT",
        "REUNE_LOG_LEVEL",
        "REUNE_LOG_FORMAT",
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
