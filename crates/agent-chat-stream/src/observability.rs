use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "agent-chat.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    ["AGENT_CHAT_OBSERVABILITY_ENABLED", "AGENT_CHAT_OBSERVABILITY"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok())
        .map_or(true, |value| parse_bool_env(&value).unwrap_or(true))
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("AGENT_CHAT_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initializes process-wide tracing once. Later calls are no-ops.
///
/// Environment variables:
/// - `AGENT_CHAT_OBSERVABILITY_ENABLED` / `AGENT_CHAT_OBSERVABILITY`: enable flag (default enabled).
/// - `AGENT_CHAT_LOG_LEVEL`: filter directive (`info`, `agent_chat_stream=debug`, ...).
/// - `AGENT_CHAT_JSON_LOG_PATH`: write JSON lines to this file instead of the console.
/// - `RUST_LOG`: fallback filter.
///
/// Console output goes to stderr so stdout stays free for rendered responses.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        match std::env::var("AGENT_CHAT_JSON_LOG_PATH") {
            Ok(path_raw) if !path_raw.trim().is_empty() => {
                let path = std::path::PathBuf::from(path_raw.trim());
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            _ => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
