use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

#[derive(Error, Debug, PartialEq)]
#[error("'{0}' is not a valid email address")]
pub struct EmailError(String);

impl FromStr for Email {
    type Err = EmailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || EmailError(value.to_string());

        let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
        if local.trim().is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        if domain.trim().is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return Err(invalid());
        }

        Ok(Self(value.to_string()))
    }
}

impl Email {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_is_accepted() {
        assert!("test@example.com".parse::<Email>().is_ok());
    }

    #[test]
    fn missing_at_symbol_is_rejected() {
        assert!("testexample.com".parse::<Email>().is_err());
    }

    #[test]
    fn multiple_at_symbols_are_rejected() {
        assert!("test@@example.com".parse::<Email>().is_err());
    }

    #[test]
    fn missing_local_part_is_rejected() {
        assert!("@example.com".parse::<Email>().is_err());
    }

    #[test]
    fn domain_without_dot_is_rejected() {
        assert!("test@example".parse::<Email>().is_err());
    }
}
