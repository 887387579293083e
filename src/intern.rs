//! The encoder's adaptive string-interning dictionary.
//!
//! Strings the encoder sees repeatedly graduate into a dictionary so later
//! occurrences ship as small indices instead of bytes. A bounded usage
//! tracker approximates frequency counting: candidates that recur within a
//! sliding window of distinct strings get promoted, everything else ages
//! out. Maintenance (purge, reindex, clear) is driven by the encoder.

use std::collections::{HashMap, VecDeque};

/// Strings of this length or shorter are never interned; a dictionary
/// reference would not be smaller than the bytes themselves.
pub const TINY_STRING_SIZE: usize = 4;

/// A tracked string's count must reach this for promotion.
pub const INTERN_THRESH: u64 = 10;

/// Maximum number of distinct strings the usage tracker observes at once.
pub const INTERN_CACHE_SIZE: usize = 1000;

/// Bounded counter table that decides when a candidate string has recurred
/// often enough to be worth interning.
///
/// Tracks at most `capacity` distinct strings; inserting past that evicts
/// the oldest tracked entry, which biases promotion toward strings that
/// recur within a window of recent distinct candidates.
#[derive(Debug)]
pub struct UsageTracker {
    counts: HashMap<String, u64>,
    order: VecDeque<String>,
    threshold: u64,
    capacity: usize,
}

impl UsageTracker {
    /// Create a tracker promoting at `threshold` observations, holding at
    /// most `capacity` distinct strings.
    pub fn new(threshold: u64, capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            order: VecDeque::new(),
            threshold,
            capacity,
        }
    }

    /// Observe one occurrence of `s`. Returns `true` when this observation
    /// reaches the promotion threshold; the entry is then forgotten (its
    /// caller owns it as a dictionary entry from here on).
    pub fn observe(&mut self, s: &str) -> bool {
        if self.threshold <= 1 {
            return true;
        }
        if let Some(count) = self.counts.get_mut(s) {
            *count += 1;
            if *count >= self.threshold {
                self.counts.remove(s);
                if let Some(i) = self.order.iter().position(|t| t == s) {
                    self.order.remove(i);
                }
                return true;
            }
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.counts.remove(&oldest);
            }
        }
        self.counts.insert(s.to_owned(), 1);
        self.order.push_back(s.to_owned());
        false
    }

    /// Forget all tracked strings.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.order.clear();
    }

    /// Number of distinct strings currently tracked.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug)]
struct InternEntry {
    index: usize,
    occurrences: u64,
}

/// The encoder-side dictionary: interned strings in wire order plus the
/// lookup and usage-tracking state that decides what gets in.
///
/// Indices are dense and stable until a reindex or clear; the encoder must
/// emit a dict-clear record before reusing the index space after either.
#[derive(Debug)]
pub struct StringIntern {
    /// Interned strings; position is the wire index.
    entries: Vec<String>,
    /// Interned string -> index and post-promotion occurrence count.
    lookup: HashMap<String, InternEntry>,
    tiny_len: usize,
    tracker: UsageTracker,
}

impl Default for StringIntern {
    fn default() -> Self {
        Self::new(TINY_STRING_SIZE, INTERN_THRESH, INTERN_CACHE_SIZE)
    }
}

impl StringIntern {
    /// Create an intern table with explicit tuning.
    pub fn new(tiny_len: usize, intern_threshold: u64, cache_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            tiny_len,
            tracker: UsageTracker::new(intern_threshold, cache_size),
        }
    }

    /// The dictionary index for `s`, if it has one (or earns one now).
    ///
    /// `intern` is a hint: `Some(true)` forces interning (still subject to
    /// the tiny-string floor), `Some(false)` forces inlining, `None` defers
    /// to the usage tracker.
    pub fn index_of(&mut self, s: &str, intern: Option<bool>) -> Option<usize> {
        if s.len() <= self.tiny_len {
            return None;
        }
        if intern == Some(false) {
            return None;
        }

        if let Some(entry) = self.lookup.get_mut(s) {
            entry.occurrences += 1;
            return Some(entry.index);
        }

        let force = intern == Some(true);
        if force || self.tracker.observe(s) {
            let index = self.entries.len();
            self.lookup
                .insert(s.to_owned(), InternEntry { index, occurrences: 1 });
            self.entries.push(s.to_owned());
            Some(index)
        } else {
            None
        }
    }

    /// Interned strings in wire order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries, optionally also forgetting the usage tracker.
    pub fn clear(&mut self, reset_tracker: bool) {
        self.entries.clear();
        self.lookup.clear();
        if reset_tracker {
            self.tracker.clear();
        }
    }

    /// Drop entries observed fewer than `threshold` times since promotion.
    /// Returns the number purged.
    ///
    /// Surviving entries keep their indices: `entries` is left untouched so
    /// indices already on the wire stay valid until the next dict-clear. A
    /// purged string that recurs is re-interned under a fresh index.
    pub fn purge(&mut self, threshold: u64) -> usize {
        let before = self.lookup.len();
        self.lookup.retain(|_, entry| entry.occurrences >= threshold);
        before - self.lookup.len()
    }

    /// Purge, then renumber the survivors by descending occurrence count so
    /// the hottest strings get the shortest varint indices. Returns the
    /// number purged.
    ///
    /// The index space changes, so the caller must emit a dict-clear record
    /// before any of the new indices reach the wire.
    pub fn reindex(&mut self, threshold: u64) -> usize {
        let purged = self.purge(threshold);

        self.entries.clear();
        self.entries.extend(self.lookup.keys().cloned());
        self.entries.sort_by(|a, b| {
            let oa = self.lookup[a].occurrences;
            let ob = self.lookup[b].occurrences;
            ob.cmp(&oa).then_with(|| a.cmp(b))
        });
        for (index, s) in self.entries.iter().enumerate() {
            if let Some(entry) = self.lookup.get_mut(s) {
                entry.index = index;
            }
        }

        purged
    }
}
