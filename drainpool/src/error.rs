//! Error types and result definitions for executor operations.
//!
//! [`DrainError`] carries an [`ErrorKind`] for programmatic handling, a static description, an
//! optional dynamic detail, an optional source, and the callsite and backtrace captured where it
//! was created. Several errors, for example one per panicked worker, can be aggregated into one.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use drainpool_config::shared::ValidationError;

/// Convenient result type for executor operations.
pub type DrainResult<T> = Result<T, DrainError>;

/// Boxed error returned by fallible tasks.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the executor.
///
/// Cloning is cheap: the source and backtrace are reference counted, which lets the same error
/// be handed both to a [`crate::task::TaskHandle`] and to the observer of the failing task.
#[derive(Debug, Clone)]
pub struct DrainError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, used when several workers fail during one shutdown.
    Many {
        errors: Vec<DrainError>,
        location: &'static Location<'static>,
    },
}

/// Categories of executor errors.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Admission
    Rejected,
    TimedOut,
    InvalidTask,

    // Task execution
    TaskFailed,
    TaskPanicked,
    TaskAbandoned,

    // Lifecycle
    ShutdownTimedOut,
    WorkerPanic,
    InvalidState,

    // Configuration
    ConfigError,

    Unknown,
}

impl ErrorKind {
    /// Returns `true` for outcomes the caller can recover from by retrying, waiting longer,
    /// or accepting partial completion.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Rejected | ErrorKind::TimedOut | ErrorKind::ShutdownTimedOut
        )
    }
}

impl DrainError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error, or [`ErrorKind::Unknown`] when
    /// empty.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many { errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the aggregated errors, or [`None`] for a single error.
    pub fn errors(&self) -> Option<&[DrainError]> {
        match &self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { errors, .. } => Some(errors),
        }
    }

    /// Returns the static description of a single error.
    pub fn description(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => Some(&payload.description),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the dynamic detail, or the first available one for aggregates.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many { errors, .. } => errors.iter().find_map(|err| err.detail()),
        }
    }

    /// Returns the captured backtrace of a single error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.repr {
            ErrorRepr::Single(payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error. Has no effect on aggregates.
    pub fn with_source<E>(self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.with_shared_source(Arc::new(source))
    }

    /// Attaches an already boxed originating error, as returned by fallible tasks.
    pub fn with_boxed_source(self, source: BoxError) -> Self {
        self.with_shared_source(Arc::from(source))
    }

    fn with_shared_source(mut self, source: Arc<dyn error::Error + Send + Sync>) -> Self {
        if let ErrorRepr::Single(payload) = &mut self.repr {
            payload.source = Some(source);
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        DrainError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for DrainError {
    fn eq(&self, other: &DrainError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for DrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                if payload.backtrace.status() == BacktraceStatus::Captured {
                    write_indented(f, "Backtrace:", &payload.backtrace.to_string())?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

/// Writes a titled block of text indented under the error headline.
fn write_indented(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {title}")?;
    if body.trim().is_empty() {
        return write!(f, " <empty>");
    }

    for line in body.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl error::Error for DrainError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for DrainError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> DrainError {
        DrainError::from_components(kind, Cow::Borrowed(description), None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for DrainError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> DrainError {
        DrainError::from_components(kind, Cow::Borrowed(description), Some(detail.into()))
    }
}

/// Aggregates errors. A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for DrainError
where
    E: Into<DrainError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> DrainError {
        let location = Location::caller();
        let mut errors: Vec<DrainError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        DrainError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<ValidationError> for DrainError {
    #[track_caller]
    fn from(err: ValidationError) -> DrainError {
        let detail = err.to_string();
        DrainError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid executor configuration"),
            Some(Cow::Owned(detail)),
        )
        .with_source(err)
    }
}
