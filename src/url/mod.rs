//! URL handling module for Site-Binder
//!
//! This module provides URL normalization and link classification.

mod classify;
mod normalize;

pub use classify::{is_invalid_scheme, ExclusionPolicy, ExclusionReason, LinkClass, LinkClassifier};
pub use normalize::{normalize_parsed, normalize_url};

use crate::{BinderError, UrlError};
use url::Url;

/// Parses and normalizes the seed URL for a run
///
/// An unusable seed is the only run-fatal input, so it is rejected here
/// before any work is dispatched.
pub fn parse_seed(seed: &str) -> Result<Url, BinderError> {
    normalize_url(seed).map_err(|e| BinderError::InvalidSeed {
        url: seed.to_string(),
        reason: match e {
            UrlError::Parse(msg) => msg,
            UrlError::InvalidScheme(msg) => msg,
            UrlError::MissingHost => "missing host".to_string(),
        },
    })
}
