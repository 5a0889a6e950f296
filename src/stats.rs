//! Named counters with hit/miss/retry semantics, tree-composable across
//! cache tiers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const HIT: &str = "hit";
pub const MISS: &str = "miss";
pub const RETRY: &str = "retry";

/// Lock-free named counters owned by a single cache tier.
#[derive(Debug)]
pub struct SimpleStats {
    name: String,
    counters: std::sync::RwLock<BTreeMap<String, AtomicI64>>,
}

impl SimpleStats {
    pub fn new(name: impl Into<String>) -> Arc<SimpleStats> {
        let name = name.into();
        let mut counters = BTreeMap::new();
        counters.insert(HIT.to_string(), AtomicI64::new(0));
        counters.insert(MISS.to_string(), AtomicI64::new(0));
        Arc::new(SimpleStats {
            name,
            counters: std::sync::RwLock::new(counters),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increment `key` by one, registering it first if it is new (e.g.
    /// `"retry"`, which only some tiers use).
    pub fn increment(&self, key: &str) {
        {
            let counters = self.counters.read().unwrap();
            if let Some(counter) = counters.get(key) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, key: &str) -> i64 {
        self.counters
            .read()
            .unwrap()
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn hit(&self) -> i64 {
        self.get(HIT)
    }

    pub fn miss(&self) -> i64 {
        self.get(MISS)
    }

    pub fn retrieve_count(&self) -> i64 {
        self.hit() + self.miss()
    }

    /// Hit rate as a percentage, or the `-1.0` sentinel when the cache is
    /// cold (`retrieve_count() == 0`), per Open Question #4.
    pub fn hit_rate(&self) -> f64 {
        let retrieve = self.retrieve_count();
        if retrieve == 0 {
            -1.0
        } else {
            (self.hit() as f64 / retrieve as f64) * 100.0
        }
    }

    /// `"<name>: retrieve: <n>, <key>: <v>, ..."`, keys sorted
    /// lexicographically.
    pub fn cache_stats(&self) -> String {
        let counters = self.counters.read().unwrap();
        let mut parts = vec![format!("retrieve: {}", self.retrieve_count())];
        for (key, value) in counters.iter() {
            parts.push(format!("{key}: {}", value.load(Ordering::Relaxed)));
        }
        format!("{}: {}", self.name, parts.join(", "))
    }
}

/// One node of a statistics tree: either a single tier's counters, or the
/// combination of two further nodes. Lets a 3+ tier cache chain (e.g.
/// `Local -> S3 -> Direct`) expose one combined tree instead of flattening
/// to a fixed depth.
#[derive(Clone)]
pub enum StatsNode {
    Leaf(Arc<SimpleStats>),
    Combined(Arc<AggregateStats>),
}

impl StatsNode {
    pub fn name(&self) -> String {
        match self {
            StatsNode::Leaf(s) => s.name().to_string(),
            StatsNode::Combined(a) => format!("{}+{}", a.a.name(), a.b.name()),
        }
    }

    pub fn hit(&self) -> i64 {
        match self {
            StatsNode::Leaf(s) => s.hit(),
            StatsNode::Combined(a) => a.hit(),
        }
    }

    pub fn miss(&self) -> i64 {
        match self {
            StatsNode::Leaf(s) => s.miss(),
            StatsNode::Combined(a) => a.miss(),
        }
    }

    pub fn retrieve_count(&self) -> i64 {
        self.hit() + self.miss()
    }

    pub fn cache_stats(&self) -> String {
        match self {
            StatsNode::Leaf(s) => s.cache_stats(),
            StatsNode::Combined(a) => a.cache_stats(),
        }
    }
}

/// Composition of two stats tree nodes. Counters sum across children;
/// `cache_stats()` concatenates both children's reports.
pub struct AggregateStats {
    pub a: StatsNode,
    pub b: StatsNode,
}

impl AggregateStats {
    pub fn combine(a: StatsNode, b: StatsNode) -> AggregateStats {
        AggregateStats { a, b }
    }

    pub fn hit(&self) -> i64 {
        self.a.hit() + self.b.hit()
    }

    pub fn miss(&self) -> i64 {
        self.a.miss() + self.b.miss()
    }

    pub fn retrieve_count(&self) -> i64 {
        self.hit() + self.miss()
    }

    pub fn cache_stats(&self) -> String {
        format!("{}, {}", self.a.cache_stats(), self.b.cache_stats())
    }

    pub fn children(&self) -> BTreeMap<String, StatsNode> {
        let mut map = BTreeMap::new();
        map.insert(self.a.name(), self.a.clone());
        map.insert(self.b.name(), self.b.clone());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_sentinel_when_cold() {
        let stats = SimpleStats::new("local");
        assert_eq!(stats.hit_rate(), -1.0);
    }

    #[test]
    fn hit_rate_computes_percentage() {
        let stats = SimpleStats::new("local");
        stats.increment(HIT);
        stats.increment(HIT);
        stats.increment(HIT);
        stats.increment(MISS);
        assert_eq!(stats.hit_rate(), 75.0);
    }

    #[test]
    fn cache_stats_formats_sorted_keys() {
        let stats = SimpleStats::new("local");
        stats.increment(MISS);
        stats.increment(RETRY);
        let formatted = stats.cache_stats();
        assert!(formatted.starts_with("local: retrieve: 1"));
        assert!(formatted.contains("hit: 0"));
        assert!(formatted.contains("miss: 1"));
        assert!(formatted.contains("retry: 1"));
    }

    #[test]
    fn aggregate_sums_children_and_concatenates_reports() {
        let a = SimpleStats::new("a");
        let b = SimpleStats::new("b");
        a.increment(HIT);
        b.increment(MISS);
        let combined = AggregateStats::combine(StatsNode::Leaf(a), StatsNode::Leaf(b));
        assert_eq!(combined.hit(), 1);
        assert_eq!(combined.miss(), 1);
        assert_eq!(combined.retrieve_count(), 2);
        assert!(combined.cache_stats().contains("a: retrieve"));
        assert!(combined.cache_stats().contains("b: retrieve"));
    }
}
