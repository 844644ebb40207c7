//! Error handling and result types.
//!
//! Everything that can fail returns the [`Result`] alias below. Fatal
//! conditions bubble up to `main` as `color_eyre` reports, which prints a
//! message and exits non-zero; recoverable conditions are logged and handled
//! at the call site instead of being raised.

/// Standard result type used throughout the crate, with `color_eyre` error
/// reporting (colorized output, chain-able contexts via `.wrap_err()`).
pub type Result<T> = color_eyre::eyre::Result<T>;
