//! # MDM Core
//!
//! Domain types for the market data manager: asset identity, class-specific
//! metadata and OHLCV bars.
//!
//! This crate performs no I/O. Storage lives in `mdm-warehouse`.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Assets, metadata, intervals, timestamps and bars |
//! | [`error`] | [`ValidationError`] raised by constructors and validators |

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::ValidationError;
