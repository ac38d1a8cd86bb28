//! Namespaced test-address generation.
//!
//! Addresses are random, not guaranteed unique; the namespace exists to
//! keep parallel test workers out of each other's traffic, not to make
//! addresses globally unique.

use mailtest_common::namespace::{Namespace, NamespaceMode};
use rand::Rng;

const LOCAL_PART_LEN: usize = 12;

const DOMAINS: &[&str] = &["example.com", "example.net", "example.org"];

/// Produce a fresh address scoped to the namespace: prefix mode
/// prepends the namespace to the local part, subdomain mode appends
/// `.<namespace>` to the domain.
#[must_use]
pub fn generate(namespace: &Namespace) -> String {
    let mut rng = rand::rng();

    let local: String = (&mut rng)
        .sample_iter(rand::distr::Alphanumeric)
        .take(LOCAL_PART_LEN)
        .map(|byte| (byte as char).to_ascii_lowercase())
        .collect();
    let domain = DOMAINS[rng.random_range(0..DOMAINS.len())];

    match namespace.mode() {
        NamespaceMode::Prefix => format!("{}{local}@{domain}", namespace.value()),
        NamespaceMode::Subdomain if namespace.value().is_empty() => {
            format!("{local}@{domain}")
        }
        NamespaceMode::Subdomain => format!("{local}@{domain}.{}", namespace.value()),
    }
}
