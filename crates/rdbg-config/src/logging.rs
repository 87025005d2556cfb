use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, Once, OnceLock, PoisonError};

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt, TestWriter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

use crate::{sanitize_error_message, LoggingConfig};

/// Ring buffer of the most recent formatted log lines.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(8_192))),
        }
    }

    pub fn push_line(&self, line: String) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(line);
    }

    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.iter().rev().take(n).cloned().rev().collect()
    }
}

/// Only lines that look like serde diagnostics can echo adapter-provided
/// values; everything else is written untouched.
fn line_contains_serde_error(line: &str) -> bool {
    line.contains("invalid type:")
        || line.contains("invalid value:")
        || line.contains("unknown field")
        || line.contains("unknown variant")
}

fn sanitize_plain_line(line: &str) -> String {
    if line_contains_serde_error(line) {
        sanitize_error_message(line)
    } else {
        line.to_owned()
    }
}

fn sanitize_json_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if line_contains_serde_error(&s) => {
            serde_json::Value::String(sanitize_error_message(&s))
        }
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sanitize_json_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize_json_value(value)))
                .collect(),
        ),
        other => other,
    }
}

fn sanitize_json_line(line: &str) -> String {
    if !line_contains_serde_error(line) {
        return line.to_owned();
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => serde_json::to_string(&sanitize_json_value(value))
            .unwrap_or_else(|_| sanitize_error_message(line)),
        Err(_) => sanitize_error_message(line),
    }
}

#[derive(Clone, Copy, Debug)]
enum LogSanitizeMode {
    PlainText,
    Json,
}

fn sanitize_text(text: &str, mode: LogSanitizeMode) -> String {
    let mut out = String::with_capacity(text.len());
    for chunk in text.split_inclusive('\n') {
        let (line, newline) = match chunk.strip_suffix('\n') {
            Some(line) => (line.trim_end_matches('\r'), true),
            None => (chunk.trim_end_matches('\r'), false),
        };
        out.push_str(&match mode {
            LogSanitizeMode::PlainText => sanitize_plain_line(line),
            LogSanitizeMode::Json => sanitize_json_line(line),
        });
        if newline {
            out.push('\n');
        }
    }
    out
}

struct SanitizingMakeWriter<M> {
    inner: M,
    mode: LogSanitizeMode,
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            bytes: Vec::new(),
            mode: self.mode,
        }
    }
}

/// Buffers one event and sanitizes it as a whole on drop.
struct SanitizingWriter<W: Write> {
    inner: W,
    bytes: Vec<u8>,
    mode: LogSanitizeMode,
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        if self.bytes.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.bytes);
        let sanitized = sanitize_text(&text, self.mode);
        let _ = self.inner.write_all(sanitized.as_bytes());
        let _ = self.inner.flush();
    }
}

struct LogBufferMakeWriter {
    buffer: Arc<LogBuffer>,
}

impl<'a> MakeWriter<'a> for LogBufferMakeWriter {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.buffer.clone(),
            bytes: Vec::new(),
        }
    }
}

struct LogBufferWriter {
    buffer: Arc<LogBuffer>,
    bytes: Vec<u8>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogBufferWriter {
    fn drop(&mut self) {
        if self.bytes.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.bytes);
        for line in text.split_terminator('\n') {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.buffer.push_line(line.to_owned());
            }
        }
    }
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self.file.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();
static LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();

/// Opens the configured log file for appending. `Err` carries the path that
/// could not be opened.
fn open_log_file(logging: &LoggingConfig) -> Result<Option<Arc<Mutex<File>>>, &Path> {
    let Some(path) = logging.file.as_deref() else {
        return Ok(None);
    };
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|file| Some(Arc::new(Mutex::new(file))))
        .map_err(|_| path)
}

/// Every sink a log line goes to: the in-memory buffer first, then stderr and
/// the log file when configured, all behind the redacting writer.
fn sinks(
    logging: &LoggingConfig,
    buffer: Arc<LogBuffer>,
    file: Option<Arc<Mutex<File>>>,
) -> SanitizingMakeWriter<BoxMakeWriter> {
    let mut sinks = BoxMakeWriter::new(LogBufferMakeWriter { buffer });
    if logging.stderr {
        // `TestWriter` keeps output captured under `cargo test`.
        sinks = if cfg!(debug_assertions) {
            BoxMakeWriter::new(sinks.and(TestWriter::with_stderr))
        } else {
            BoxMakeWriter::new(sinks.and(io::stderr))
        };
    }
    if let Some(file) = file {
        sinks = BoxMakeWriter::new(sinks.and(MutexFileMakeWriter { file }));
    }
    let mode = if logging.json {
        LogSanitizeMode::Json
    } else {
        LogSanitizeMode::PlainText
    };
    SanitizingMakeWriter { inner: sinks, mode }
}

/// Installs the global `tracing` subscriber for the inspector.
///
/// Only the first call installs anything; later calls return the same log
/// buffer and ignore their argument.
pub fn init_tracing(logging: &LoggingConfig) -> Arc<LogBuffer> {
    let buffer = LOG_BUFFER
        .get_or_init(|| Arc::new(LogBuffer::new(logging.buffer_lines)))
        .clone();

    TRACING_INIT.call_once(|| {
        let (file, unopened) = match open_log_file(logging) {
            Ok(file) => (file, None),
            Err(path) => (None, Some(path)),
        };
        let writer = sinks(logging, buffer.clone(), file);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        let layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        };

        let installed = tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(logging.env_filter())
                .with(layer),
        )
        .is_ok();
        if let (true, Some(path)) = (installed, unopened) {
            tracing::warn!(
                target: "rdbg.config",
                path = %path.display(),
                "log file could not be opened; logging to the remaining sinks"
            );
        }
    });

    buffer
}
