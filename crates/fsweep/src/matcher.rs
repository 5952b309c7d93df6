//! Quick filtering and full match evaluation.
//!
//! [`should_process`] is the walker-side cheap rejection: it runs once per
//! enumerated file and allocates nothing on the accept path for UTF-8
//! names. [`matches`] is the full pattern check run by matcher workers, and
//! [`matches_constraints`] applies the size/age window.

use std::borrow::Cow;
use std::fs::Metadata;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::options::SearchOptions;
use crate::pattern::CompiledPatterns;

/// Cheap per-path rejection before a path is batched: hidden files,
/// skip-listed extensions, and names that cannot possibly match any
/// compiled name pattern.
pub fn should_process(path: &Path, opts: &SearchOptions, patterns: &CompiledPatterns) -> bool {
    let name = base_name(path);
    let name_bytes = name.as_bytes();

    if opts.exclude_hidden && name_bytes.first() == Some(&b'.') {
        return false;
    }

    if !opts.skip_extensions.is_empty() {
        let ext = extension_of(&name);
        if !ext.is_empty() {
            let bare = ext.trim_start_matches('.');
            if opts
                .skip_extensions
                .iter()
                .any(|skip| skip.trim_start_matches('.').eq_ignore_ascii_case(bare))
            {
                return false;
            }
        }
    }

    if patterns.names.is_empty() {
        return true;
    }
    patterns.names.iter().any(|pattern| {
        let literal = pattern.longest_literal();
        literal.is_empty() || contains_bytes(name_bytes, literal, patterns.ignore_case)
    })
}

/// Full pattern match against the base name, short-circuiting through the
/// common-token set. An empty compiled set accepts everything; configured
/// extensions are a requirement, not merely a shortcut.
pub fn matches(path: &Path, patterns: &CompiledPatterns) -> bool {
    if patterns.is_empty() {
        return true;
    }

    let name = base_name(path);
    let folded_name = fold_bytes(name.as_bytes(), patterns.ignore_case);
    let ext = extension_of(&name);
    let folded_ext = fold_bytes(ext.as_bytes(), patterns.ignore_case);

    if patterns.common.contains(folded_name.as_ref()) {
        return true;
    }
    if !ext.is_empty() && patterns.common.contains(folded_ext.as_ref()) {
        return true;
    }

    if !patterns.extensions.is_empty()
        && !patterns.extensions.iter().any(|e| e[..] == *folded_ext)
    {
        return false;
    }

    patterns
        .names
        .iter()
        .any(|pattern| pattern.matches(&folded_name))
}

/// Size and age window check. Zero bounds are open on that side; ages are
/// measured from `now` back to the last modification.
pub fn matches_constraints(meta: &Metadata, opts: &SearchOptions, now: SystemTime) -> bool {
    let size = meta.len();
    if opts.min_size > 0 && size < opts.min_size {
        return false;
    }
    if opts.max_size > 0 && size > opts.max_size {
        return false;
    }

    if !opts.min_age.is_zero() || !opts.max_age.is_zero() {
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if !opts.min_age.is_zero() && age < opts.min_age {
            return false;
        }
        if !opts.max_age.is_zero() && age > opts.max_age {
            return false;
        }
    }

    true
}

fn base_name(path: &Path) -> Cow<'_, str> {
    match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => path.to_string_lossy(),
    }
}

/// Extension including the leading dot, or `""` when the name has none.
/// A bare leading dot counts, so `.profile` has extension `.profile`.
fn extension_of<'a>(name: &'a str) -> &'a str {
    match name.rfind('.') {
        Some(pos) => &name[pos..],
        None => "",
    }
}

fn fold_bytes(raw: &[u8], ignore_case: bool) -> Cow<'_, [u8]> {
    if ignore_case && raw.iter().any(u8::is_ascii_uppercase) {
        Cow::Owned(raw.to_ascii_lowercase())
    } else {
        Cow::Borrowed(raw)
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8], ignore_case: bool) -> bool {
    if !ignore_case {
        return memchr::memmem::find(haystack, needle).is_some();
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
