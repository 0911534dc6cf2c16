//! # Policy Diff Suppression
//!
//! The service stores policies in its own formatting: whitespace between
//! elements is rewritten, self-closing tags are padded, and quotes inside
//! .NET policy expressions (`@(...)`, `@{...}`) come back entity-encoded.
//! None of that is a real change to the policy, so it must not show up as
//! drift between configuration and state.

use regex::Regex;
use std::sync::LazyLock;

static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r">\s+<").expect("Failed to compile regex - this should never happen")
});

static SELF_CLOSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+/>").expect("Failed to compile regex - this should never happen")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("Failed to compile regex - this should never happen")
});

/// Whether `old` and `new` describe the same policy document
pub fn xml_with_dotnet_interpolations_diff_suppress(old: &str, new: &str) -> bool {
    if old == new {
        return true;
    }
    if old.trim().is_empty() || new.trim().is_empty() {
        return false;
    }

    // Plain XML first: formatting-only differences
    if normalize_xml(old) == normalize_xml(new) {
        return true;
    }

    normalize_with_interpolations(old) == normalize_with_interpolations(new)
}

fn normalize_xml(input: &str) -> String {
    let value = input.trim().replace('\r', "");
    let value = BETWEEN_TAGS.replace_all(&value, "><");
    SELF_CLOSING.replace_all(&value, "/>").into_owned()
}

fn normalize_with_interpolations(input: &str) -> String {
    let decoded = html_escape::decode_html_entities(input);
    let value = normalize_xml(&decoded);
    WHITESPACE.replace_all(&value, " ").into_owned()
}
