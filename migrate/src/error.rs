//! Error types and result definitions for migration operations.
//!
//! Provides a classified error system for the row migration engine. The
//! [`MigrateError`] type carries an [`ErrorKind`] used by the executor to decide
//! whether a failure is row-scoped (counted, recorded in the id map, run
//! continues) or run-fatal (the run aborts and the id map is left re-runnable).

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for migration operations using [`MigrateError`] as the error type.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Detailed payload stored for single [`MigrateError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for migration operations.
///
/// A [`MigrateError`] is either a single classified error or an aggregation of
/// several, e.g. the per-entry failures collected by a rollback pass.
#[derive(Debug, Clone)]
pub struct MigrateError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<MigrateError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur during a migration run.
///
/// The executor's propagation policy keys off this classification: see
/// [`ErrorKind::is_row_scoped`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A pre-flight requirement failed. Aborts the run before any row is touched.
    RequirementsNotMet,
    /// The source system cannot be reached or queried. Run-fatal.
    SourceUnavailable,
    /// The id map storage layer failed. Run-fatal at open, row-fatal inside the loop.
    StorageFailure,
    /// The destination rejected a row write. Row-scoped.
    DestinationWriteFailed,
    /// A value crossed a validation boundary it is not allowed to cross,
    /// e.g. a list handed to the placeholder renderer. Row-scoped when raised
    /// during pipeline execution, hard otherwise.
    InvalidArgument,
    /// A migration definition or plugin configuration is malformed.
    ConfigError,
    /// A process plugin name has no registered builder.
    PluginNotFound,
    /// A value could not be coerced to the type an operation requires.
    ConversionError,
    /// An operation was attempted in a state that does not allow it.
    InvalidState,
    /// Uncategorized.
    Unknown,
}

impl ErrorKind {
    /// Returns true when a failure of this kind is contained to one row.
    ///
    /// Row-scoped failures are recorded against the row's id map entry and the
    /// import loop continues with the next row.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            ErrorKind::DestinationWriteFailed
                | ErrorKind::InvalidArgument
                | ErrorKind::ConversionError
        )
    }
}

impl MigrateError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] when the aggregation is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the callsite that created this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        MigrateError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
            }),
        }
    }
}

/// Equality compares kinds only; detail, location, and sources are diagnostic.
impl PartialEq for MigrateError {
    fn eq(&self, other: &MigrateError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    payload.location.file(),
                    payload.location.line(),
                )?;
                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }
                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} errors aggregated @ {}:{}",
                    errors.len(),
                    location.file(),
                    location.line(),
                )?;
                for (index, error) in errors.iter().enumerate() {
                    for (n, line) in format!("{error}").lines().enumerate() {
                        if n == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // Aggregates forward the first contained error as their source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`MigrateError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for MigrateError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> MigrateError {
        MigrateError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`MigrateError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for MigrateError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> MigrateError {
        MigrateError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates a vector of errors.
///
/// A single-element vector unwraps to that error directly.
impl<E> From<Vec<E>> for MigrateError
where
    E: Into<MigrateError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> MigrateError {
        let location = Location::caller();
        let mut errors: Vec<MigrateError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        MigrateError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`serde_json::Error`] with [`ErrorKind::ConversionError`].
///
/// Id tuples and row values serialize through serde_json on their way into the
/// id map, so storage code can use `?` on those conversions.
impl From<serde_json::Error> for MigrateError {
    #[track_caller]
    fn from(err: serde_json::Error) -> MigrateError {
        let detail = err.to_string();
        MigrateError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Value serialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] with [`ErrorKind::StorageFailure`].
impl From<sqlx::Error> for MigrateError {
    #[track_caller]
    fn from(err: sqlx::Error) -> MigrateError {
        let detail = err.to_string();
        MigrateError::from_components(
            ErrorKind::StorageFailure,
            Cow::Borrowed("Id map storage operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
