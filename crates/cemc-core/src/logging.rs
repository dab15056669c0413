//! Thin logging sink threaded through the run manager.
//!
//! Kernels write no process-wide state; whoever owns the run manager
//! decides where log lines go (stdout for the CLI, nowhere for tests).

/// Minimal logging capability handed to the run manager.
pub trait LogSink {
    /// Fine-grained progress lines.
    fn debug(&self, _message: &str) {}

    /// Run and series milestones.
    fn info(&self, message: &str);

    /// Recoverable anomalies (a failed run in a continuing sweep).
    fn warn(&self, message: &str);
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}

/// Writes messages to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn warn(&self, message: &str) {
        println!("Warning: {message}");
    }
}
