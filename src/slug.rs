//! Identifier generation for stored records.
//!
//! An identifier is a slug derived from a human-readable name followed by a
//! millisecond timestamp, e.g. `annual-report-1718000000000`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Maximum length of the slug part, before the timestamp suffix.
pub const MAX_SLUG_LEN: usize = 60;

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Lowercases `name`, collapses every run of non `[a-z0-9]` characters into a
/// single `-`, trims hyphens from both ends and truncates to [`MAX_SLUG_LEN`].
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Builds `<slug>-<millis>`, using `fallback` when `name` has no usable characters.
pub fn make_id(name: &str, fallback: &str) -> String {
    let slug = slugify(name);
    let base = if slug.is_empty() { fallback } else { &slug };
    format!("{base}-{}", unique_millis())
}

/// Like [`make_id`], but drops a trailing file extension first.
pub fn make_id_from_file_name(file_name: &str, fallback: &str) -> String {
    make_id(strip_extension(file_name), fallback)
}

pub fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() && !file_name[idx + 1..].contains('/') => {
            &file_name[..idx]
        }
        _ => file_name,
    }
}

/// Current time in milliseconds, strictly increasing across calls in this process.
pub fn unique_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_MILLIS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
