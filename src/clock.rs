use chrono::{SecondsFormat, Utc};
use std::fmt::Write;

/// Renders the timestamps embedded in bus messages
#[derive(Debug, Clone)]
pub enum Timestamper {
    /// Current UTC time in a strftime format
    Utc { format: String },
    /// Always the same text, for deterministic output
    Fixed(String),
}

impl Timestamper {
    pub fn utc<S: Into<String>>(format: S) -> Self {
        Timestamper::Utc {
            format: format.into(),
        }
    }

    pub fn fixed<S: Into<String>>(text: S) -> Self {
        Timestamper::Fixed(text.into())
    }

    /// Render the current time.
    ///
    /// A format chrono cannot render falls back to RFC 3339 with milliseconds.
    pub fn now(&self) -> String {
        match self {
            Timestamper::Utc { format } => {
                let now = Utc::now();
                let mut rendered = String::new();
                match write!(rendered, "{}", now.format(format)) {
                    Ok(()) => rendered,
                    Err(_) => now.to_rfc3339_opts(SecondsFormat::Millis, true),
                }
            }
            Timestamper::Fixed(text) => text.clone(),
        }
    }
}
