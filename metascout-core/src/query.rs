//! Derive search queries from file names.

use metascout_model::WorkItem;
use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}")
        .expect("bracket regex should compile")
});

static EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.[A-Za-z0-9]{2,4}$").expect("extension regex should compile")
});

static FC2: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)fc2[-_ ]?(?:ppv[-_ ]?)?(\d{5,8})")
        .expect("fc2 regex should compile")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])([a-z]{2,6})[-_ ]?(\d{2,5})(?:[^0-9]|$)")
        .expect("number regex should compile")
});

/// Extract an item identifier such as `ABC-123` from a file name.
///
/// Bracketed tags and the extension are ignored. Returns `None` when the
/// label carries nothing that looks like an identifier.
pub fn extract_number(label: &str) -> Option<String> {
    let stem = EXTENSION.replace(label.trim(), "");
    let cleaned = BRACKETED.replace_all(&stem, " ");

    if let Some(caps) = FC2.captures(&cleaned) {
        return Some(format!("FC2-PPV-{}", &caps[1]));
    }

    NUMBER.captures(&cleaned).map(|caps| {
        format!("{}-{}", caps[1].to_ascii_uppercase(), &caps[2])
    })
}

/// Build a work item for a file, unprocessable when no identifier is found.
pub fn work_item_from_label(label: impl Into<String>) -> WorkItem {
    let label = label.into();
    let query = extract_number(&label);
    WorkItem::new(label, query)
}
