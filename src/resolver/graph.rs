//! Pair graph and breadth-first conversion path search

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::types::{ConversionPath, TradingPair};

/// Undirected adjacency over directly tradable pairs
///
/// Multiple sources offering the same economic pair appear as parallel
/// edges; each one is a distinct traversal option. Direction only matters
/// later, when prices are composed.
pub struct PairGraph {
    adjacency: BTreeMap<String, BTreeMap<String, Vec<TradingPair>>>,
}

impl PairGraph {
    /// Build the adjacency restricted to `asset_subset`.
    pub fn build<'a, I>(pairs: I, asset_subset: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = &'a TradingPair>,
    {
        let mut adjacency: BTreeMap<String, BTreeMap<String, Vec<TradingPair>>> = BTreeMap::new();
        for pair in pairs {
            if !asset_subset.contains(&pair.asset) || !asset_subset.contains(&pair.ref_asset) {
                continue;
            }
            adjacency
                .entry(pair.asset.clone())
                .or_default()
                .entry(pair.ref_asset.clone())
                .or_default()
                .push(pair.clone());
            adjacency
                .entry(pair.ref_asset.clone())
                .or_default()
                .entry(pair.asset.clone())
                .or_default()
                .push(pair.clone());
        }
        Self { adjacency }
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.adjacency.contains_key(asset)
    }

    /// Iterate conversion paths from `origin` to `target`, shortest first.
    ///
    /// Paths use at most `max_hops` pairs and never revisit an asset. With a
    /// hop-spread cutoff, exploration stops once candidates get more than
    /// `hop_spread` hops longer than the first path yielded.
    pub fn paths(
        &self,
        origin: &str,
        target: &str,
        max_hops: usize,
        hop_spread: Option<u32>,
    ) -> PathSearch<'_> {
        let mut queue = VecDeque::new();
        if self.contains(origin) && self.contains(target) {
            queue.push_back((vec![origin.to_string()], Vec::new()));
        }
        PathSearch {
            graph: self,
            target: target.to_string(),
            max_hops,
            hop_spread,
            queue,
            ready: VecDeque::new(),
            first_hit: None,
        }
    }
}

/// Breadth-first worklist over partial paths
pub struct PathSearch<'g> {
    graph: &'g PairGraph,
    target: String,
    max_hops: usize,
    hop_spread: Option<u32>,
    /// Frontier of (assets seen, pairs used) states
    queue: VecDeque<(Vec<String>, Vec<TradingPair>)>,
    /// Target-reaching paths found but not yet handed out
    ready: VecDeque<ConversionPath>,
    /// Hop count of the first path found
    first_hit: Option<usize>,
}

impl PathSearch<'_> {
    /// Candidate length beyond which the search is abandoned
    fn over_cutoff(&self, hops: usize) -> bool {
        match (self.first_hit, self.hop_spread) {
            (Some(first), Some(spread)) => hops > first + spread as usize,
            _ => false,
        }
    }
}

impl Iterator for PathSearch<'_> {
    type Item = ConversionPath;

    fn next(&mut self) -> Option<ConversionPath> {
        loop {
            if let Some(path) = self.ready.pop_front() {
                return Some(path);
            }
            let (seen, used) = self.queue.pop_front()?;
            let current = seen.last().expect("worklist state has at least the origin");
            let Some(neighbours) = self.graph.adjacency.get(current) else {
                continue;
            };
            let hops = used.len() + 1;
            if self.over_cutoff(hops) {
                // BFS yields in non-decreasing length: nothing shorter is left
                self.queue.clear();
                continue;
            }
            for (next_asset, pairs) in neighbours {
                if seen.contains(next_asset) {
                    continue;
                }
                for pair in pairs {
                    if *next_asset == self.target {
                        if hops > self.max_hops {
                            continue;
                        }
                        let mut assets = seen.clone();
                        assets.push(next_asset.clone());
                        let mut path_pairs = used.clone();
                        path_pairs.push(pair.clone());
                        self.first_hit.get_or_insert(hops);
                        self.ready.push_back(ConversionPath {
                            assets,
                            pairs: path_pairs,
                        });
                    } else if hops < self.max_hops && !self.over_cutoff(hops + 1) {
                        let mut assets = seen.clone();
                        assets.push(next_asset.clone());
                        let mut path_pairs = used.clone();
                        path_pairs.push(pair.clone());
                        self.queue.push_back((assets, path_pairs));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(asset: &str, ref_asset: &str, source: &str) -> TradingPair {
        TradingPair::new(
            &format!("{}{}", asset, ref_asset),
            asset,
            ref_asset,
            source,
        )
    }

    fn subset(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_direct_path_found_first() {
        let pairs = vec![
            pair("ETH", "USDT", "binance"),
            pair("ETH", "BTC", "binance"),
            pair("BTC", "USDT", "binance"),
        ];
        let graph = PairGraph::build(&pairs, &subset(&["ETH", "BTC", "USDT"]));

        let found: Vec<ConversionPath> = graph.paths("ETH", "USDT", 3, None).collect();
        assert!(!found.is_empty());
        assert_eq!(found[0].assets, vec!["ETH", "USDT"]);
        assert_eq!(found[0].hops(), 1);
        // Hop counts never decrease
        for w in found.windows(2) {
            assert!(w[0].hops() <= w[1].hops());
        }
        // The 2-hop alternative via BTC is also discovered
        assert!(found.iter().any(|p| p.assets == vec!["ETH", "BTC", "USDT"]));
    }

    #[test]
    fn test_multi_hop_only() {
        let pairs = vec![pair("ETH", "BTC", "binance"), pair("BTC", "USDT", "binance")];
        let graph = PairGraph::build(&pairs, &subset(&["ETH", "BTC", "USDT"]));

        let found: Vec<ConversionPath> = graph.paths("ETH", "USDT", 3, None).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].assets, vec!["ETH", "BTC", "USDT"]);
        assert_eq!(found[0].pairs.len(), 2);
    }

    #[test]
    fn test_no_asset_revisited_and_max_hops_respected() {
        let pairs = vec![
            pair("A", "B", "s"),
            pair("B", "C", "s"),
            pair("C", "D", "s"),
            pair("D", "A", "s"),
            pair("B", "D", "s"),
        ];
        let graph = PairGraph::build(&pairs, &subset(&["A", "B", "C", "D"]));

        for path in graph.paths("A", "C", 2, None) {
            assert!(path.hops() <= 2);
            let mut seen = HashSet::new();
            for asset in &path.assets {
                assert!(seen.insert(asset.clone()), "asset revisited in {}", path);
            }
        }

        // With a single hop allowed, C is unreachable from A
        assert_eq!(graph.paths("A", "C", 1, None).count(), 0);
    }

    #[test]
    fn test_parallel_edges_are_distinct_options() {
        let pairs = vec![pair("BTC", "USDT", "binance"), pair("BTC", "USDT", "kucoin")];
        let graph = PairGraph::build(&pairs, &subset(&["BTC", "USDT"]));

        let found: Vec<ConversionPath> = graph.paths("BTC", "USDT", 3, None).collect();
        assert_eq!(found.len(), 2);
        let sources: HashSet<String> =
            found.iter().map(|p| p.pairs[0].source.clone()).collect();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_subset_restriction() {
        let pairs = vec![pair("ETH", "BTC", "s"), pair("BTC", "USDT", "s")];
        // BTC excluded from the subset: no bridge between ETH and USDT
        let graph = PairGraph::build(&pairs, &subset(&["ETH", "USDT"]));
        assert_eq!(graph.paths("ETH", "USDT", 3, None).count(), 0);
    }

    #[test]
    fn test_absent_endpoints_yield_nothing() {
        let pairs = vec![pair("BTC", "USDT", "s")];
        let graph = PairGraph::build(&pairs, &subset(&["BTC", "USDT"]));
        assert_eq!(graph.paths("DOGE", "USDT", 3, None).count(), 0);
        assert_eq!(graph.paths("BTC", "DOGE", 3, None).count(), 0);
    }

    #[test]
    fn test_hop_spread_cutoff() {
        // A-Z direct, plus a 2-hop and a 3-hop detour
        let pairs = vec![
            pair("A", "Z", "s"),
            pair("A", "B", "s"),
            pair("B", "Z", "s"),
            pair("B", "C", "s"),
            pair("C", "Z", "s"),
        ];
        let graph = PairGraph::build(&pairs, &subset(&["A", "B", "C", "Z"]));

        // Unbounded spread sees all three path lengths
        let lens: Vec<usize> = graph.paths("A", "Z", 4, None).map(|p| p.hops()).collect();
        assert_eq!(lens, vec![1, 2, 3]);

        // Spread 0 keeps only shortest-length paths
        let lens: Vec<usize> = graph.paths("A", "Z", 4, Some(0)).map(|p| p.hops()).collect();
        assert_eq!(lens, vec![1]);

        // Spread 1 admits the 2-hop detour but not the 3-hop one
        let lens: Vec<usize> = graph.paths("A", "Z", 4, Some(1)).map(|p| p.hops()).collect();
        assert_eq!(lens, vec![1, 2]);
    }
}
