use std::{fs, io::Write};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use ragprobe::paths;

/// How stdout logging should look.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
    pub pretty: bool,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// Stdout gets human-readable or JSON lines depending on `options`. When a
/// `run_id` is given, a full DEBUG JSON log is also written to
/// `~/.ragprobe/logs/run-<id>.log`; keep the returned guard alive until exit
/// so that file is flushed.
pub fn init(options: LogOptions, run_id: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_env_filter(options.verbose));
    let mut layers = vec![stdout_layer(options, filter)];
    let guard = match run_id.and_then(run_log_layer) {
        Some((layer, guard)) => {
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).init();
    guard
}

fn stdout_layer(options: LogOptions, filter: EnvFilter) -> BoxedLayer {
    match (options.json, options.pretty, options.verbose) {
        (true, true, _) => Box::new(
            fmt::layer()
                .json()
                .with_writer(|| PrettyJsonWriter::new(std::io::stdout()))
                .with_filter(filter),
        ),
        (true, false, _) => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_filter(filter),
        ),
        (false, _, true) => Box::new(fmt::layer().with_writer(std::io::stdout).with_filter(filter)),
        (false, _, false) => Box::new(
            fmt::layer()
                .with_writer(std::io::stdout)
                .without_time()
                .with_target(false)
                .with_filter(filter),
        ),
    }
}

fn run_log_layer(run_id: &str) -> Option<(BoxedLayer, WorkerGuard)> {
    let log_dir = paths::data_dir().join("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log dir {}: {e}", log_dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::never(&log_dir, format!("run-{run_id}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(Targets::new().with_default(tracing::Level::DEBUG));
    Some((Box::new(layer), guard))
}

fn default_env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("ragprobe=debug,info")
    } else {
        EnvFilter::new("ragprobe=info,warn")
    }
}

/// Re-indents each JSON log record; anything that is not a JSON object passes through.
struct PrettyJsonWriter<W: Write> {
    inner: W,
}

impl<W: Write> PrettyJsonWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for PrettyJsonWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let parsed = std::str::from_utf8(buf)
            .ok()
            .map(str::trim)
            .filter(|s| s.starts_with('{') && s.ends_with('}'))
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok());
        match parsed {
            Some(value) => {
                serde_json::to_writer_pretty(&mut self.inner, &value)?;
                self.inner.write_all(b"\n")?;
                Ok(buf.len())
            }
            None => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_writer_indents_json_records() {
        let mut out = Vec::new();
        let mut writer = PrettyJsonWriter::new(&mut out);
        writer.write_all(b"{\"level\":\"INFO\",\"message\":\"hi\"}\n").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("{\n"));
        assert!(text.contains("  \"message\": \"hi\""));
    }

    #[test]
    fn pretty_writer_passes_plain_text_through() {
        let mut out = Vec::new();
        let mut writer = PrettyJsonWriter::new(&mut out);
        writer.write_all(b"plain line\n").unwrap();
        assert_eq!(out, b"plain line\n");
    }
}
