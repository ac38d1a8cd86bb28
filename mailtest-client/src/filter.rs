//! Predicates over decoded emails.

use core::fmt::{self, Display, Formatter};

use mailtest_common::email::Email;

/// A filter is either a bare recipient address (shorthand for a single
/// `to` requirement) or a list of field requirements.
///
/// The `to` field matches when any address in the email's `to` list
/// contains the value as a substring; every other field, including
/// custom properties, matches by exact equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Recipient(String),
    Fields(Vec<(String, String)>),
}

impl Filter {
    pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn matches(&self, email: &Email) -> bool {
        match self {
            Self::Recipient(to) => to_contains(email, to),
            Self::Fields(pairs) => pairs.iter().all(|(key, value)| {
                if key == "to" {
                    to_contains(email, value)
                } else {
                    email.field(key) == Some(value.as_str())
                }
            }),
        }
    }
}

fn to_contains(email: &Email, needle: &str) -> bool {
    email.to.iter().any(|address| address.contains(needle))
}

impl From<&str> for Filter {
    fn from(recipient: &str) -> Self {
        Self::Recipient(recipient.to_string())
    }
}

impl From<String> for Filter {
    fn from(recipient: String) -> Self {
        Self::Recipient(recipient)
    }
}

impl Display for Filter {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recipient(to) => fmt.write_str(to),
            Self::Fields(pairs) => {
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }
                    write!(fmt, "{key}={value}")?;
                }
                Ok(())
            }
        }
    }
}
