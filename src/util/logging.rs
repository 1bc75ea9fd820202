//! Logging initialization.

use crate::config::LogFormat;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Arguments
///
/// * `level` - Log level filter (e.g., "info", "debug")
/// * `format` - Log output format (json or pretty)
/// * `file` - Append logs to this file instead of stdout
///
/// # Returns
///
/// An error if the log file cannot be opened.
pub fn init_logging(level: &str, format: &LogFormat, file: Option<&Path>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (writer, ansi) = make_writer(file)?;

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
            .init(),
    }
    Ok(())
}

/// Pick the log sink. Colour codes are only emitted on stdout.
fn make_writer(file: Option<&Path>) -> io::Result<(BoxMakeWriter, bool)> {
    match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok((BoxMakeWriter::new(Mutex::new(file)), false))
        }
        None => Ok((BoxMakeWriter::new(io::stdout), true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // The global subscriber can only be installed once per process, so only
    // the writer selection is tested here.
    #[test]
    fn test_file_writer_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dice.log");

        let (_, ansi) = make_writer(Some(&path)).unwrap();
        assert!(!ansi);
        assert!(path.exists());
    }

    #[test]
    fn test_file_writer_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("dice.log");
        assert!(make_writer(Some(&path)).is_err());
    }

    #[test]
    fn test_stdout_writer() {
        let (_, ansi) = make_writer(None).unwrap();
        assert!(ansi);
    }
}
