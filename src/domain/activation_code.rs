use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Length of generated activation codes
const CODE_LEN: usize = 40;

/// A random, unguessable code authorizing state-changing actions on a single
/// subscription (activate, unsubscribe, update) without requiring login.
///
/// Generated once at subscription creation and stored alongside the
/// subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationCode(String);

impl ActivationCode {
    /// Generate a fresh random code
    pub fn generate() -> Self {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LEN)
            .map(char::from)
            .collect();

        Self(code)
    }
}

impl AsRef<str> for ActivationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ActivationCode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.len() != CODE_LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Parsing("Activation code of incorrect format".into()));
        }
        Ok(Self(value.to_string()))
    }
}
