use std::collections::HashMap;

use super::*;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_match_connection_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.connection(), ConnectionConfig::default());
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
page_url = "http://10.0.0.2:8000/"
retry_limit = 2
retry_wait_ms = 250
"#,
    );

    assert_eq!(settings.page_url, "http://10.0.0.2:8000/");
    assert_eq!(
        settings.connection(),
        ConnectionConfig {
            retry_limit: 2,
            retry_wait: Duration::from_millis(250),
        }
    );
    assert_eq!(settings.layout_path, Settings::default().layout_path);
}

#[test]
fn unreadable_file_leaves_settings_untouched() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "retry_limit = \"many\"");
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_wins_over_legacy_name() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[
            ("CONSOLE_PAGE_URL", "http://legacy:1/"),
            ("APP__PAGE_URL", "http://current:2/"),
            ("APP__LAYOUT_PATH", "/tmp/layout.json"),
            ("APP__LOG_FILTER", "debug"),
        ]),
    );
    assert_eq!(settings.page_url, "http://current:2/");
    assert_eq!(settings.layout_path, PathBuf::from("/tmp/layout.json"));
    assert_eq!(settings.log_filter, "debug");
}

#[test]
fn non_numeric_env_values_are_ignored() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[("APP__RETRY_LIMIT", "lots"), ("APP__RETRY_WAIT_MS", "500")]),
    );
    assert_eq!(settings.retry_limit, 5);
    assert_eq!(settings.retry_wait_ms, 500);
}

#[test]
fn oversized_durations_saturate_instead_of_wrapping() {
    assert_eq!(saturating_millis(Duration::from_millis(2000)), 2000);
    assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    assert_eq!(Settings::default().retry_wait_ms, 2000);
}
