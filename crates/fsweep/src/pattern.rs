//! Pattern compilation.
//!
//! User pattern strings are compiled once per search into byte-level forms
//! the matchers can run without further allocation: extensions are
//! dot-normalized, everything is ASCII-folded when the search ignores case,
//! and exact name/extension tokens land in a flat set for O(1) early
//! acceptance.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::options::SearchOptions;

/// A compiled name pattern. Patterns without `*` are substring matches
/// against the base name; patterns with `*` match the whole base name with
/// `*` standing for any sequence.
#[derive(Debug, Clone)]
pub(crate) enum NamePattern {
    Substring(Vec<u8>),
    Wildcard {
        glob: Vec<u8>,
        /// Longest literal run, used by the quick filter as a cheap
        /// necessary condition before the full glob walk.
        literal: Vec<u8>,
    },
}

impl NamePattern {
    pub(crate) fn longest_literal(&self) -> &[u8] {
        match self {
            Self::Substring(bytes) => bytes,
            Self::Wildcard { literal, .. } => literal,
        }
    }

    /// Full match against an already case-folded base name.
    pub(crate) fn matches(&self, folded_name: &[u8]) -> bool {
        match self {
            Self::Substring(needle) => memchr::memmem::find(folded_name, needle).is_some(),
            Self::Wildcard { glob, .. } => wildcard_match(glob, folded_name),
        }
    }
}

/// The immutable product of compiling a [`SearchOptions`] pattern set.
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    pub(crate) names: Vec<NamePattern>,
    /// Dot-prefixed, folded extension tokens.
    pub(crate) extensions: Vec<Vec<u8>>,
    /// Exact name and extension tokens for O(1) early acceptance.
    pub(crate) common: HashSet<Vec<u8>>,
    pub(crate) ignore_case: bool,
}

impl CompiledPatterns {
    pub fn compile(opts: &SearchOptions) -> Self {
        Self::compile_with_cache(opts, &FoldCache::new())
    }

    pub fn compile_with_cache(opts: &SearchOptions, cache: &FoldCache) -> Self {
        let mut extensions = Vec::with_capacity(opts.extensions.len());
        let mut names = Vec::with_capacity(opts.patterns.len());
        let mut common = HashSet::with_capacity(opts.patterns.len() + opts.extensions.len());

        for ext in &opts.extensions {
            if ext.is_empty() {
                continue;
            }
            let normalized = if ext.starts_with('.') {
                ext.clone()
            } else {
                format!(".{ext}")
            };
            let bytes = fold(cache, normalized.as_bytes(), opts.ignore_case);
            common.insert(bytes.clone());
            extensions.push(bytes);
        }

        for pattern in &opts.patterns {
            if pattern.is_empty() {
                continue;
            }
            let bytes = fold(cache, pattern.as_bytes(), opts.ignore_case);
            common.insert(bytes.clone());
            names.push(if bytes.contains(&b'*') {
                let literal = longest_literal_run(&bytes).to_vec();
                NamePattern::Wildcard {
                    glob: bytes,
                    literal,
                }
            } else {
                NamePattern::Substring(bytes)
            });
        }

        Self {
            names,
            extensions,
            common,
            ignore_case: opts.ignore_case,
        }
    }

    /// An empty compiled set matches every file.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.extensions.is_empty()
    }
}

/// Read-mostly cache of `raw bytes → lowercased bytes`, shared by repeated
/// compilations so hot tokens are folded once.
#[derive(Debug, Default)]
pub struct FoldCache {
    lower: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl FoldCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lower(&self, raw: &[u8]) -> Vec<u8> {
        if let Ok(cache) = self.lower.read() {
            if let Some(hit) = cache.get(raw) {
                return hit.clone();
            }
        }
        let folded = raw.to_ascii_lowercase();
        if let Ok(mut cache) = self.lower.write() {
            cache.insert(raw.to_vec(), folded.clone());
        }
        folded
    }
}

fn fold(cache: &FoldCache, raw: &[u8], ignore_case: bool) -> Vec<u8> {
    if ignore_case {
        cache.lower(raw)
    } else {
        raw.to_vec()
    }
}

fn longest_literal_run(glob: &[u8]) -> &[u8] {
    glob.split(|&b| b == b'*')
        .max_by_key(|run| run.len())
        .unwrap_or(&[])
}

/// Matches `pattern` (with `*` as any byte sequence) against the whole of
/// `candidate`, greedy star with backtracking.
pub(crate) fn wildcard_match(pattern: &[u8], candidate: &[u8]) -> bool {
    let mut p = 0usize;
    let mut c = 0usize;
    let mut star: Option<usize> = None;
    let mut star_c = 0usize;

    while c < candidate.len() {
        if p < pattern.len() && pattern[p] != b'*' && pattern[p] == candidate[c] {
            p += 1;
            c += 1;
            continue;
        }
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            p += 1;
            star_c = c;
            continue;
        }
        if let Some(last_star) = star {
            p = last_star + 1;
            star_c += 1;
            c = star_c;
            continue;
        }
        return false;
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
