//! Injected status channel.
//!
//! The engine emits human-readable progress through a [`StatusSink`] instead
//! of printing; callers decide where the lines go.  The CLI uses the stderr
//! sink, tests and embedders that want silence use [`NullSink`].

/// Receiver for progress and diagnostic lines.
pub trait StatusSink {
    fn line(&self, msg: &str);
}

/// Writes every line to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl StatusSink for StderrSink {
    fn line(&self, msg: &str) {
        eprintln!("{msg}");
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn line(&self, _msg: &str) {}
}

/// Percentage of bytes saved by compression, clamped to 0 for stored or
/// grown payloads.
pub fn saved_percent(comp_size: u64, uncomp_size: u64) -> f64 {
    if uncomp_size == 0 || comp_size >= uncomp_size {
        0.0
    } else {
        (1.0 - comp_size as f64 / uncomp_size as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_percent_edges() {
        assert_eq!(saved_percent(0, 0), 0.0);
        assert_eq!(saved_percent(14, 14), 0.0);
        assert_eq!(saved_percent(25, 100), 75.0);
    }
}
