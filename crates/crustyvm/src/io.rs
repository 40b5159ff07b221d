//! Log output abstraction.
//!
//! The engine never writes to stdout/stderr directly. Everything diagnostic
//! (debug traces, per-pass dumps, runtime traces) goes through a [`LogWriter`]
//! supplied by the host at construction time. Compile errors are returned as
//! values and do not pass through the sink.

/// Destination for diagnostic output from the VM.
///
/// Implementations receive one complete line at a time, without a trailing
/// newline.
pub trait LogWriter {
    /// Writes a single line of diagnostic output.
    fn log(&mut self, line: &str);
}

/// Log sink that writes to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLog;

impl LogWriter for StdLog {
    fn log(&mut self, line: &str) {
        eprintln!("{line}");
    }
}

/// Log sink that discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLog;

impl LogWriter for NoLog {
    fn log(&mut self, _line: &str) {}
}

/// Log sink that collects output into memory.
///
/// Useful in tests and in hosts that surface diagnostics in their own UI.
#[derive(Debug, Default, Clone)]
pub struct CollectStringLog {
    lines: Vec<String>,
}

impl CollectStringLog {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the collector and returns all output joined with newlines.
    #[must_use]
    pub fn into_string(self) -> String {
        self.lines.join("\n")
    }
}

impl LogWriter for CollectStringLog {
    fn log(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

impl<T: LogWriter + ?Sized> LogWriter for &mut T {
    fn log(&mut self, line: &str) {
        (**self).log(line);
    }
}
