//! Crate-wide error convention: a small hand-written error type at each
//! component boundary that can fail for more than one structurally
//! distinct reason, propagated by call sites via `anyhow`. No `thiserror`.

use std::fmt;

#[derive(Debug)]
pub enum ReflectorErrorKind {
    Config,
    Bind,
}

#[derive(Debug)]
pub struct ReflectorError {
    kind: ReflectorErrorKind,
    message: String,
}

impl ReflectorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: ReflectorErrorKind::Config,
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Self {
            kind: ReflectorErrorKind::Bind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &ReflectorErrorKind {
        &self.kind
    }
}

impl fmt::Display for ReflectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReflectorErrorKind::Config => write!(f, "configuration error: {}", self.message),
            ReflectorErrorKind::Bind => write!(f, "socket bind error: {}", self.message),
        }
    }
}

impl std::error::Error for ReflectorError {}
