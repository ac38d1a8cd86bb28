//! Namespaces scope a mail client to a subset of relay traffic.
//!
//! A namespace is applied either as a literal prefix of the recipient's
//! local part, or as a suffix of the domain after the `@`. Matching is
//! case-sensitive on the raw strings; any case-normalisation is the
//! address generator's business, not the relay's.

use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    #[default]
    Prefix,
    Subdomain,
}

impl Display for NamespaceMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Prefix => "prefix",
            Self::Subdomain => "subdomain",
        })
    }
}

impl FromStr for NamespaceMode {
    type Err = ();

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "subdomain" => Ok(Self::Subdomain),
            "prefix" => Ok(Self::Prefix),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    value: String,
    mode: NamespaceMode,
}

impl Namespace {
    #[must_use]
    pub fn new(value: impl Into<String>, mode: NamespaceMode) -> Self {
        Self {
            value: value.into(),
            mode,
        }
    }

    #[must_use]
    pub fn prefix(value: impl Into<String>) -> Self {
        Self::new(value, NamespaceMode::Prefix)
    }

    #[must_use]
    pub fn subdomain(value: impl Into<String>) -> Self {
        Self::new(value, NamespaceMode::Subdomain)
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn mode(&self) -> NamespaceMode {
        self.mode
    }

    /// Whether a recipient address falls inside this namespace.
    ///
    /// An empty namespace matches everything, which is what an
    /// unscoped listener connection registers as.
    #[must_use]
    pub fn matches(&self, recipient: &str) -> bool {
        if self.value.is_empty() {
            return true;
        }

        let (local, domain) = recipient
            .split_once('@')
            .map_or((recipient, ""), |(local, domain)| (local, domain));

        match self.mode {
            NamespaceMode::Prefix => local.starts_with(&self.value),
            NamespaceMode::Subdomain => {
                domain == self.value || domain.ends_with(&format!(".{}", self.value))
            }
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}:{}", self.mode, self.value)
    }
}
