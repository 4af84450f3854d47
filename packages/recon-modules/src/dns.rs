//! DNS name helpers for deriving lookup keys.

use recon_core::{Event, TARGET_TAG};

/// Lowercase and strip surrounding whitespace and the trailing root dot.
pub fn normalize_dns_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Drop the left-most label, keeping at least two labels.
///
/// `www.example.com` becomes `example.com`; `example.com` stays as is.
pub fn parent_domain(name: &str) -> &str {
    match name.split_once('.') {
        Some((_, rest)) if rest.contains('.') => rest,
        _ => name,
    }
}

/// The lookup key a source should be queried with for `event`.
///
/// Scan targets are queried as given; discovered names are queried by their
/// parent domain so siblings share one cached lookup.
pub fn make_query(event: &Event) -> String {
    let name = normalize_dns_name(event.value());
    if event.has_tag(TARGET_TAG) {
        name
    } else {
        parent_domain(&name).to_string()
    }
}
