// tests/settings_config.rs
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use digest_bot::config::{
    load_settings_default, load_settings_from, Credentials, Settings, SourceKind, ENV_CHAT_ID,
    ENV_CONFIG_PATH, ENV_METRICS_ADDR, ENV_TOKEN, ENV_TOKEN_LEGACY,
};
use digest_bot::scheduler::ScheduleEntry;

const TOML: &str = r#"
schedule = ["07:30", "19:45"]
tick_secs = 30
fetch_timeout_secs = 8
status_source = "sjc"

[[sources]]
name = "news"
heading = "📰 **Today's news:**"
kind = "rss"
url = "https://dantri.com.vn/rss/home.rss"
limit = 3

[[sources]]
name = "sjc"
heading = "📢 **Gold prices today:**"
empty_text = "No prices."
kind = "html_table"
url = "https://sjc.com.vn/giavang"
"#;

const JSON: &str = r#"{
  "schedule": ["08:00"],
  "sources": [
    {
      "name": "gold",
      "heading": "Gold",
      "kind": "json_price",
      "url": "https://www.doji.vn/api/data",
      "path": ["GiaVang", "data", "SJC", "Hồ Chí Minh"],
      "label": "SJC HCM"
    }
  ]
}"#;

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, body).unwrap();
    path
}

fn clear_env() {
    for var in [
        ENV_CONFIG_PATH,
        ENV_METRICS_ADDR,
        ENV_TOKEN,
        ENV_TOKEN_LEGACY,
        ENV_CHAT_ID,
    ] {
        std::env::remove_var(var);
    }
}

#[test]
fn toml_file_with_defaults_filled_in() {
    let dir = TempDir::new().unwrap();
    let s = load_settings_from(&write(&dir, "digest.toml", TOML)).unwrap();

    assert_eq!(
        s.schedule,
        vec![ScheduleEntry::new(7, 30).unwrap(), ScheduleEntry::new(19, 45).unwrap()]
    );
    assert_eq!(s.tick_secs, 30);
    assert_eq!(s.fetch_timeout_secs, 8);
    assert_eq!(s.sources.len(), 2);
    assert_eq!(s.sources[0].marker, "📌");
    assert_eq!(
        s.sources[0].kind,
        SourceKind::Rss {
            url: "https://dantri.com.vn/rss/home.rss".into(),
            limit: 3
        }
    );
    assert_eq!(
        s.sources[1].kind,
        SourceKind::HtmlTable {
            url: "https://sjc.com.vn/giavang".into(),
            table_class: "table-responsive".into(),
            rows: 3
        }
    );
    assert_eq!(s.sources[1].empty_text.as_deref(), Some("No prices."));
}

#[test]
fn json_file_is_accepted() {
    let dir = TempDir::new().unwrap();
    let s = load_settings_from(&write(&dir, "digest.json", JSON)).unwrap();
    assert_eq!(s.status_source, "gold");
    assert_eq!(s.tick_secs, 60);
    match &s.sources[0].kind {
        SourceKind::JsonPrice {
            path,
            label,
            buy_field,
            sell_field,
            ..
        } => {
            assert_eq!(path.len(), 4);
            assert_eq!(label, "SJC HCM");
            assert_eq!((buy_field.as_str(), sell_field.as_str()), ("buy", "sell"));
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[test]
fn bad_schedule_entry_is_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let body = TOML.replace("19:45", "25:00");
    let err = load_settings_from(&write(&dir, "digest.toml", &body)).unwrap_err();
    assert!(format!("{err:#}").contains("25:00"), "{err:#}");
}

#[test]
fn unknown_status_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let body = TOML.replace(r#"status_source = "sjc""#, r#"status_source = "silver""#);
    let err = load_settings_from(&write(&dir, "digest.toml", &body)).unwrap_err();
    assert!(err.to_string().contains("silver"));
}

#[test]
fn tick_longer_than_a_minute_is_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let body = TOML
        .replace("tick_secs = 30", "tick_secs = 120")
        .replace(r#"["07:30", "19:45"]"#, r#"["23:59"]"#);
    let err = load_settings_from(&write(&dir, "digest.toml", &body)).unwrap_err();
    assert!(err.to_string().contains("tick_secs"), "{err:#}");
}

#[test]
fn bad_metrics_addr_in_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let body = format!("metrics_addr = \"not-an-addr\"\n{TOML}");
    let err = load_settings_from(&write(&dir, "digest.toml", &body)).unwrap_err();
    assert!(err.to_string().contains("not-an-addr"), "{err:#}");
}

#[test]
#[serial]
fn env_override_is_applied_before_validation() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let body = format!("metrics_addr = \"not-an-addr\"\n{TOML}");
    let path = write(&dir, "digest.toml", &body);
    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var(ENV_METRICS_ADDR, "127.0.0.1:9100");

    let loaded = load_settings_default();
    clear_env();

    assert_eq!(
        loaded.unwrap().metrics_addr.as_deref(),
        Some("127.0.0.1:9100")
    );
}

#[test]
#[serial]
fn env_path_wins_over_working_directory() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "custom/bot.json", JSON);
    std::env::set_var(ENV_CONFIG_PATH, &path);

    let s = load_settings_default().unwrap();
    assert_eq!(s.schedule, vec![ScheduleEntry::new(8, 0).unwrap()]);
    clear_env();
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/digest.toml");
    assert!(load_settings_default().is_err());
    clear_env();
}

#[test]
#[serial]
fn falls_back_to_config_dir_then_defaults() {
    clear_env();
    let cwd = std::env::current_dir().unwrap();
    let dir = TempDir::new().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let defaults = load_settings_default();
    write(&dir, "config/digest.toml", TOML);
    let from_file = load_settings_default();
    std::env::set_var(ENV_METRICS_ADDR, "127.0.0.1:9898");
    let with_metrics = load_settings_default();

    std::env::set_current_dir(cwd).unwrap();
    clear_env();

    let defaults = defaults.unwrap();
    assert_eq!(defaults, Settings::default());
    assert_eq!(defaults.schedule.len(), 3);

    assert_eq!(from_file.unwrap().status_source, "sjc");
    assert_eq!(
        with_metrics.unwrap().metrics_addr.as_deref(),
        Some("127.0.0.1:9898")
    );
}

#[test]
#[serial]
fn credentials_prefer_the_named_token_var() {
    clear_env();
    std::env::set_var(ENV_TOKEN_LEGACY, "legacy");
    std::env::set_var(ENV_CHAT_ID, " -100123 ");
    let creds = Credentials::from_env().unwrap();
    assert_eq!(creds.token, "legacy");
    assert_eq!(creds.chat_id, "-100123");

    std::env::set_var(ENV_TOKEN, "primary");
    let creds = Credentials::from_env().unwrap();
    assert_eq!(creds.token, "primary");
    assert!(!format!("{creds:?}").contains("primary"));

    std::env::remove_var(ENV_CHAT_ID);
    assert!(Credentials::from_env().is_err());
    clear_env();
}
