use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_JSON_LOG_FILE: &str = "study-lab.logs.jsonl";

/// Where log events go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Compact lines on stderr; stdout stays reserved for command output.
    Stderr,
    /// One JSON object per line, appended to the file.
    JsonFile(PathBuf),
}

/// Logging configuration resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `study_lab=debug,reqwest=warn`.
    pub filter: String,
    pub sink: LogSink,
}

impl LogSettings {
    /// Reads `STUDY_LAB_OBSERVABILITY`, `STUDY_LAB_LOG_LEVEL`, `RUST_LOG` and
    /// `STUDY_LAB_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`. `STUDY_LAB_LOG_LEVEL` wins over
    /// `RUST_LOG`; directives that fail to parse are skipped.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("STUDY_LAB_OBSERVABILITY")
            .and_then(|value| parse_switch(&value))
            .unwrap_or(true);
        let filter = ["STUDY_LAB_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let sink = match lookup("STUDY_LAB_JSON_LOG_PATH") {
            Some(path) if !path.trim().is_empty() => {
                LogSink::JsonFile(PathBuf::from(path.trim()))
            }
            _ => LogSink::Stderr,
        };
        Self {
            enabled,
            filter,
            sink,
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name tracing-appender wants.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the global subscriber once per process using
/// [`LogSettings::from_env`]. Later calls are no-ops.
pub fn init_observability() {
    INIT.get_or_init(|| install(LogSettings::from_env()));
}

fn install(settings: LogSettings) {
    if !settings.enabled {
        return;
    }
    let filter = EnvFilter::new(&settings.filter);
    match settings.sink {
        LogSink::Stderr => {
            let console = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init();
        }
        LogSink::JsonFile(path) => {
            let (dir, file_name) = split_log_path(&path);
            if let Err(err) = std::fs::create_dir_all(&dir) {
                eprintln!("warning: cannot create log directory {}: {err}", dir.display());
            }
            let json = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(tracing_appender::rolling::never(dir, file_name));
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(json)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        LogSettings::resolve(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_warn_on_stderr() {
        assert_eq!(
            settings(&[]),
            LogSettings {
                enabled: true,
                filter: "warn".into(),
                sink: LogSink::Stderr,
            }
        );
    }

    #[test]
    fn lab_level_wins_over_rust_log() {
        let resolved = settings(&[("STUDY_LAB_LOG_LEVEL", "debug"), ("RUST_LOG", "info")]);
        assert_eq!(resolved.filter, "debug");
    }

    #[test]
    fn rust_log_is_honoured_when_lab_level_is_unset_or_blank() {
        assert_eq!(settings(&[("RUST_LOG", "study_lab=info")]).filter, "study_lab=info");
        let resolved = settings(&[("STUDY_LAB_LOG_LEVEL", "  "), ("RUST_LOG", "error")]);
        assert_eq!(resolved.filter, "error");
    }

    #[test]
    fn switch_accepts_common_spellings() {
        assert!(!settings(&[("STUDY_LAB_OBSERVABILITY", " OFF ")]).enabled);
        assert!(settings(&[("STUDY_LAB_OBSERVABILITY", "maybe")]).enabled);
    }

    #[test]
    fn json_path_selects_file_sink() {
        let resolved = settings(&[("STUDY_LAB_JSON_LOG_PATH", "logs/lab.jsonl")]);
        assert_eq!(resolved.sink, LogSink::JsonFile(PathBuf::from("logs/lab.jsonl")));
        assert_eq!(
            split_log_path(Path::new("lab.jsonl")),
            (PathBuf::from("."), "lab.jsonl".to_string())
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
        tracing::info!("observability initialised twice without panicking");
    }
}
