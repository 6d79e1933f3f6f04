//! Bounded traversals over the identity graph
//!
//! Every traversal is a breadth-first search that starts at the queried node
//! (depth 0) and follows at most `max_hops` edges. They only need the
//! [`GraphStore`] primitives, so any store can answer them.

use crate::graph::traits::{GraphResult, GraphStore};
use crate::graph::{EdgeKind, GraphNode};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// The resolved identity cluster of a URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Related {
    /// Canonical leaves of the cluster, sorted
    pub urls: Vec<String>,
    /// Set when some node of the cluster failed to fetch
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

/// One friend of a cluster and the feed chosen for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendFeed {
    pub url: String,
    pub feed: String,
}

/// Nodes reachable from `start` over `kinds` edges, `start` included
///
/// Nodes are returned in breadth-first order.
pub fn reachable(
    graph: &dyn GraphStore,
    start: &GraphNode,
    kinds: &[EdgeKind],
    max_hops: u32,
) -> GraphResult<Vec<GraphNode>> {
    walk(graph, start, kinds, max_hops, Direction::Outgoing)
}

/// Nodes that reach `start` over `kinds` edges, `start` included
pub fn reachable_from(
    graph: &dyn GraphStore,
    start: &GraphNode,
    kinds: &[EdgeKind],
    max_hops: u32,
) -> GraphResult<Vec<GraphNode>> {
    walk(graph, start, kinds, max_hops, Direction::Incoming)
}

#[derive(Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

fn walk(
    graph: &dyn GraphStore,
    start: &GraphNode,
    kinds: &[EdgeKind],
    max_hops: u32,
    direction: Direction,
) -> GraphResult<Vec<GraphNode>> {
    let mut seen = HashSet::from([start.id]);
    let mut found = vec![start.clone()];
    let mut queue = VecDeque::from([(start.id, 0u32)]);

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_hops {
            continue;
        }

        let neighbours: Vec<i64> = match direction {
            Direction::Outgoing => graph
                .outgoing(id, kinds)?
                .into_iter()
                .map(|e| e.target)
                .collect(),
            Direction::Incoming => graph
                .incoming(id, kinds)?
                .into_iter()
                .map(|e| e.source)
                .collect(),
        };

        for next in neighbours {
            if !seen.insert(next) {
                continue;
            }
            if let Some(node) = graph.get_node(next)? {
                found.push(node);
                queue.push_back((next, depth + 1));
            }
        }
    }

    Ok(found)
}

/// True when no node of the identity cluster of `node` is still unfetched
pub fn is_graph_complete(
    graph: &dyn GraphStore,
    node: &GraphNode,
    max_hops: u32,
) -> GraphResult<bool> {
    let cluster = reachable(graph, node, &EdgeKind::IDENTITY, max_hops)?;
    Ok(!cluster.iter().any(|n| n.unfetched))
}

/// Canonical leaves of the identity cluster of `node`
///
/// A leaf is a node without an outgoing `alias` edge. The result is flagged
/// incomplete if any node of the cluster carries the failed marker.
pub fn get_related(graph: &dyn GraphStore, node: &GraphNode, max_hops: u32) -> GraphResult<Related> {
    let cluster = reachable(graph, node, &EdgeKind::IDENTITY, max_hops)?;

    let mut urls = Vec::new();
    let mut incomplete = false;
    for member in &cluster {
        incomplete |= member.failed;
        if graph.outgoing(member.id, &[EdgeKind::Alias])?.is_empty() {
            urls.push(member.url.clone());
        }
    }

    urls.sort();
    urls.dedup();

    Ok(Related { urls, incomplete })
}

/// Position inside the `alias* me{0,2} alias*` walk from a friend link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FriendStep {
    node: i64,
    me_taken: u8,
    /// An alias edge was followed after a `me` edge; no more `me` allowed
    closed: bool,
}

const MAX_FRIEND_ME_HOPS: u8 = 2;

/// One feed per friend of the identity cluster of `node`
///
/// Each `friend` edge leaving the cluster is followed through the friend's
/// own aliases and up to two `me` hops; every node reached that way is a
/// friend candidate, and for each candidate with `feed` edges the smallest
/// feed URL is chosen. Results are sorted by friend URL.
pub fn get_friends_feeds(
    graph: &dyn GraphStore,
    node: &GraphNode,
    max_hops: u32,
) -> GraphResult<Vec<FriendFeed>> {
    let cluster = reachable(graph, node, &EdgeKind::IDENTITY, max_hops)?;

    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    for member in &cluster {
        for edge in graph.outgoing(member.id, &[EdgeKind::Friend])? {
            let step = FriendStep {
                node: edge.target,
                me_taken: 0,
                closed: false,
            };
            if seen.insert(step) {
                queue.push_back((step, 1u32));
            }
        }
    }

    let mut friends: HashSet<i64> = HashSet::new();
    while let Some((step, depth)) = queue.pop_front() {
        friends.insert(step.node);
        if depth >= max_hops {
            continue;
        }

        for edge in graph.outgoing(step.node, &EdgeKind::IDENTITY)? {
            let next = match edge.kind {
                EdgeKind::Alias => FriendStep {
                    node: edge.target,
                    me_taken: step.me_taken,
                    closed: step.me_taken > 0,
                },
                EdgeKind::Me if !step.closed && step.me_taken < MAX_FRIEND_ME_HOPS => FriendStep {
                    node: edge.target,
                    me_taken: step.me_taken + 1,
                    closed: false,
                },
                _ => continue,
            };
            if seen.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    let mut feeds: BTreeMap<String, String> = BTreeMap::new();
    for friend_id in friends {
        let Some(friend) = graph.get_node(friend_id)? else {
            continue;
        };

        let mut smallest: Option<String> = None;
        for edge in graph.outgoing(friend_id, &[EdgeKind::Feed])? {
            if let Some(feed) = graph.get_node(edge.target)? {
                if smallest.as_ref().map_or(true, |s| feed.url < *s) {
                    smallest = Some(feed.url);
                }
            }
        }

        if let Some(feed) = smallest {
            feeds.insert(friend.url, feed);
        }
    }

    Ok(feeds
        .into_iter()
        .map(|(url, feed)| FriendFeed { url, feed })
        .collect())
}

/// Nodes with pending webhooks whose cluster contains `node` and is complete
///
/// `node` itself is a candidate too.
pub fn webhook_ancestors(
    graph: &dyn GraphStore,
    node: &GraphNode,
    max_hops: u32,
) -> GraphResult<Vec<GraphNode>> {
    let mut ready = Vec::new();
    for ancestor in reachable_from(graph, node, &EdgeKind::IDENTITY, max_hops)? {
        if ancestor.has_webhooks && is_graph_complete(graph, &ancestor, max_hops)? {
            ready.push(ancestor);
        }
    }
    Ok(ready)
}
