//! Macros for building and returning [`crate::error::DrainError`] values.

/// Creates a [`crate::error::DrainError`] from a kind and a static description.
///
/// An optional third argument adds dynamic detail: either any `Display` value, or
/// `detail = <expr>` to move an owned [`String`] without formatting it again. A trailing
/// `source: <expr>` attaches the originating error.
#[macro_export]
macro_rules! drain_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::DrainError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::DrainError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::DrainError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::DrainError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::DrainError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::DrainError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early from the current function with a [`crate::error::DrainError`].
///
/// Accepts the same arguments as [`drain_error!`].
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::drain_error!($($args)+))
    };
}
