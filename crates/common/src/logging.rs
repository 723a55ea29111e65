//! Logging and tracing initialization.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from a [`LoggingConfig`].
///
/// `RUST_LOG` in the environment overrides the configured level. When a
/// log file is configured, output goes there instead of stderr; the
/// file is opened in append mode so one file can span many sessions. A
/// file that cannot be opened falls back to stderr rather than failing
/// startup.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let sink = config.file.as_deref().and_then(open_log_file);

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match (config.json, sink) {
        (true, Some(file)) => {
            tracing::subscriber::set_global_default(builder.json().with_writer(file).finish())
        }
        (true, None) => tracing::subscriber::set_global_default(builder.json().finish()),
        (false, Some(file)) => tracing::subscriber::set_global_default(
            builder.with_ansi(false).with_writer(file).finish(),
        ),
        (false, None) => tracing::subscriber::set_global_default(builder.finish()),
    };
    // A second init keeps the first subscriber.
    result.ok();
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}

fn open_log_file(path: &Path) -> Option<Arc<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(Arc::new(file)),
        Err(e) => {
            eprintln!("Could not open log file {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_opens_in_append_mode() {
        let path = std::env::temp_dir().join(format!("recast-logging-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let file = open_log_file(&path).unwrap();
            writeln!(&*file, "first session").unwrap();
        }
        {
            let file = open_log_file(&path).unwrap();
            writeln!(&*file, "second session").unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first session\nsecond session\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_log_dir_is_created() {
        let dir = std::env::temp_dir().join(format!("recast-logdir-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let path = dir.join("recast.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
