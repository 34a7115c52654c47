//! Bounded error object carried through the codec layers.
//!
//! Every layer attaches a context prefix and passes the error upward; the
//! statement adapter stores the final message for the host to read. There
//! is no local recovery inside the codec — a decoding failure aborts the
//! whole message.

/// Upper bound on a formatted error message. Overlong messages are
/// truncated rather than allocated without limit.
pub const MAX_ERROR_LEN: usize = 512;

/// Error kinds recognized by the codec and statement adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic engine or decoding error.
    Error,
    /// Unknown message type or malformed frame.
    Proto,
    /// Read past the end of the declared body length.
    Eom,
    /// Malformed string or tag while decoding.
    Parse,
    /// Overflow buffer allocation failed.
    Nomem,
    /// Bind index out of range on the prepared statement.
    Range,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Error => "ERROR",
            ErrorKind::Proto => "PROTO",
            ErrorKind::Eom => "EOM",
            ErrorKind::Parse => "PARSE",
            ErrorKind::Nomem => "NOMEM",
            ErrorKind::Range => "RANGE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error carrying a bounded, chainable message.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

/// Largest `n <= MAX_ERROR_LEN` that lands on a UTF-8 char boundary of
/// `s`. `String::truncate` panics on a mid-character split, and nothing
/// upstream guarantees the bounded length falls on one — engine error
/// text and caller-supplied context strings are both arbitrary UTF-8.
fn truncation_point(s: &str) -> usize {
    let mut n = s.len().min(MAX_ERROR_LEN);
    while n > 0 && !s.is_char_boundary(n) {
        n -= 1;
    }
    n
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_ERROR_LEN {
            let n = truncation_point(&message);
            message.truncate(n);
        }
        Self { kind, message }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prepend a context prefix, joined by `": "`, truncating if the
    /// result exceeds the bounded length. Mirrors `wrapf`'s chaining
    /// contract without allocating unboundedly.
    pub fn context(mut self, prefix: impl AsRef<str>) -> Self {
        let mut wrapped = String::with_capacity(prefix.as_ref().len() + 2 + self.message.len());
        wrapped.push_str(prefix.as_ref());
        wrapped.push_str(": ");
        wrapped.push_str(&self.message);
        if wrapped.len() > MAX_ERROR_LEN {
            let n = truncation_point(&wrapped);
            wrapped.truncate(n);
        }
        self.message = wrapped;
        self
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
