//! Macros for migration error handling.
//!
//! Convenience macros for creating and returning [`crate::error::MigrateError`]
//! instances without spelling out the tuple conversions.

/// Creates a [`crate::error::MigrateError`] from an error kind and description.
///
/// An optional third argument becomes the dynamic detail; an optional
/// `source:` argument attaches the originating error.
#[macro_export]
macro_rules! migrate_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::MigrateError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::MigrateError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::MigrateError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::MigrateError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns a [`crate::error::MigrateError`] from the current function.
///
/// Combines error creation with early return. Supports the same arguments as
/// [`migrate_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::migrate_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::migrate_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::migrate_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::migrate_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
