use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::hooks::Hook;

/// Bridge-wide error.
///
/// Keep this small and stable. Modules may define their own error types and map them into
/// `EngineError` before returning from a hook.
#[derive(Debug)]
pub enum EngineError {
    /// Error produced by a module while handling a lifecycle hook.
    Module {
        module: String,
        hook: Hook,
        cause: Box<EngineError>,
    },

    /// A module panicked inside a hook. The panic was contained by the registry.
    ModulePanicked {
        module: String,
        hook: Hook,
        message: String,
    },

    DuplicateModule(String),

    /// Legacy table is at capacity. Fatal: the module set is a build-time decision.
    RegistryFull { capacity: usize },

    /// Registration or broadcast after the destroy broadcast. Fatal.
    RegistryClosed,

    /// The engine side of the dispatcher is gone.
    DispatcherClosed,

    UnknownMethod { module: String, method: String },

    InvalidCall {
        module: String,
        method: String,
        reason: String,
    },

    Io { path: PathBuf, source: io::Error },

    Config { path: PathBuf, reason: String },

    /// Failure reported by the native engine (setup or step).
    Native(String),

    /// Generic error (fallback).
    Other(String),
}

impl EngineError {
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    #[inline]
    pub fn native(msg: impl Into<String>) -> Self {
        Self::Native(msg.into())
    }

    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn with_hook(module: impl Into<String>, hook: Hook, err: EngineError) -> Self {
        match err {
            already @ (EngineError::Module { .. } | EngineError::ModulePanicked { .. }) => already,
            other => EngineError::Module {
                module: module.into(),
                hook,
                cause: Box::new(other),
            },
        }
    }

    /// Fatal configuration errors abort startup instead of being logged and skipped.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::RegistryFull { .. } | EngineError::RegistryClosed)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Module {
                module,
                hook,
                cause,
            } => write!(f, "module '{module}' hook {}: {cause}", hook.as_str()),
            EngineError::ModulePanicked {
                module,
                hook,
                message,
            } => write!(f, "module '{module}' panicked in hook {}: {message}", hook.as_str()),
            EngineError::DuplicateModule(name) => write!(f, "module already registered: {name}"),
            EngineError::RegistryFull { capacity } => {
                write!(f, "legacy module table is full (capacity {capacity})")
            }
            EngineError::RegistryClosed => write!(f, "module registry is closed (destroyed)"),
            EngineError::DispatcherClosed => write!(f, "engine dispatcher is closed"),
            EngineError::UnknownMethod { module, method } => {
                write!(f, "method '{method}' is not exported by module '{module}'")
            }
            EngineError::InvalidCall {
                module,
                method,
                reason,
            } => write!(f, "invalid call {module}.{method}: {reason}"),
            EngineError::Io { path, source } => write!(f, "io error at {path:?}: {source}"),
            EngineError::Config { path, reason } => write!(f, "config error at {path:?}: {reason}"),
            EngineError::Native(s) => write!(f, "native engine: {s}"),
            EngineError::Other(s) => write!(f, "{s}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Module { cause, .. } => Some(cause.as_ref()),
            EngineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<&str> for EngineError {
    #[inline]
    fn from(value: &str) -> Self {
        EngineError::Other(value.to_string())
    }
}

impl From<String> for EngineError {
    #[inline]
    fn from(value: String) -> Self {
        EngineError::Other(value)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
