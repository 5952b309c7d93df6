//! Size and age input grammar, plus human-readable size formatting.
//!
//! Sizes accept `NNN`, `NNN.N`, with an optional `B`/`KB`/`MB`/`GB` suffix;
//! ages accept an optional `h`/`d`/`w`/`m` suffix where `m` means thirty
//! days. Both are lenient about case and surrounding whitespace, and an
//! empty string parses to zero ("no bound").

use std::time::Duration;

use crate::error::{Result, SearchError};

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Parses a size such as `1KB`, `1.5MB` or `2GB` into bytes.
pub fn parse_size(raw: &str) -> Result<u64> {
    let trimmed = raw.trim().to_ascii_uppercase();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let (number_part, multiplier) = if let Some(rest) = trimmed.strip_suffix("KB") {
        (rest, KB)
    } else if let Some(rest) = trimmed.strip_suffix("MB") {
        (rest, MB)
    } else if let Some(rest) = trimmed.strip_suffix("GB") {
        (rest, GB)
    } else if let Some(rest) = trimmed.strip_suffix('B') {
        (rest, 1)
    } else {
        (trimmed.as_str(), 1)
    };

    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| SearchError::InvalidInput(format!("invalid size: {raw:?}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(SearchError::InvalidInput(format!("invalid size: {raw:?}")));
    }
    Ok((value * multiplier as f64) as u64)
}

/// Parses an age such as `12h`, `2d`, `1w` or `1m` into a duration. A bare
/// number means hours.
pub fn parse_age(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Ok(Duration::ZERO);
    }

    const HOUR: u64 = 3600;
    let (number_part, unit_secs) = if let Some(rest) = trimmed.strip_suffix('h') {
        (rest, HOUR)
    } else if let Some(rest) = trimmed.strip_suffix('d') {
        (rest, 24 * HOUR)
    } else if let Some(rest) = trimmed.strip_suffix('w') {
        (rest, 7 * 24 * HOUR)
    } else if let Some(rest) = trimmed.strip_suffix('m') {
        (rest, 30 * 24 * HOUR)
    } else {
        (trimmed.as_str(), HOUR)
    };

    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| SearchError::InvalidInput(format!("invalid age: {raw:?}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(SearchError::InvalidInput(format!("invalid age: {raw:?}")));
    }
    let secs = value * unit_secs as f64;
    if secs >= u64::MAX as f64 {
        return Ok(Duration::MAX);
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Formats a byte count as `B`, `KB`, `MB` or `GB` with two decimals above
/// the byte range.
pub fn format_size(size: u64) -> String {
    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} B")
    }
}
