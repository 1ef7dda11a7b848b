use std::fmt;
use std::str::FromStr;

use regex::Regex;

use serde::Serialize;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

const MAX_LEN: usize = 256;

/// A validated, normalized e-mail address
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct EmailAddress(String);

impl FromStr for EmailAddress {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        lazy_static::lazy_static! {
            static ref EMAIL_REGEX: Regex = Regex::new(r"^\w+@\w+\.\w+$").unwrap();
        }

        if value.trim().is_empty() {
            return Err(Error::Parsing("Email address cannot be empty".into()));
        }
        if value.graphemes(true).count() > MAX_LEN {
            return Err(Error::Parsing("Email address too long".into()));
        }
        if !EMAIL_REGEX.is_match(value) {
            return Err(Error::Parsing("Email address of incorrect format".into()));
        }

        // Normalize
        let value = value.trim().to_lowercase();

        Ok(Self(value))
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
