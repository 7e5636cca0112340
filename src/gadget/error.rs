use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GadgetError {
    #[error("Gadget function {0} does not exist")]
    MissingFunction(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A sysfs attribute did not have the expected shape
    #[error("Malformed attribute {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// The host is not polling the endpoint and the report queue is full
    #[error("Host is not reading {kind} reports, report dropped")]
    Stalled { kind: &'static str },

    #[error("Short write on {kind} device: {written} of {expected} bytes")]
    ShortWrite {
        kind: &'static str,
        written: usize,
        expected: usize,
    },
}
