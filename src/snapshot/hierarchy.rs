//! Transitive closure over parent/child relations.
//!
//! Hierarchies come from the datastore and may contain cycles; the walk keeps a visited set.

use super::{IdSet, Relation};

/// Nodes reachable from `start` via `edges`.
/// `full = false` stops after the direct neighbours; `include_self` adds `start`.
pub fn closure(edges: &Relation, start: &str, full: bool, include_self: bool) -> IdSet {
    let mut out = IdSet::new();
    let mut stack: Vec<&str> = vec![start];
    let mut first = true;

    while let Some(node) = stack.pop() {
        if let Some(next) = edges.get(node) {
            for n in next {
                if n != start && out.insert(n.clone()) && full {
                    stack.push(n);
                }
            }
        }
        if first {
            first = false;
            if !full {
                break;
            }
        }
    }

    if include_self {
        out.insert(start.to_string());
    }
    out
}

/// Closure for several start nodes at once.
pub fn closure_all<'a, I>(edges: &Relation, starts: I, full: bool, include_self: bool) -> IdSet
where
    I: IntoIterator<Item = &'a String>,
{
    let mut out = IdSet::new();
    for s in starts {
        out.extend(closure(edges, s, full, include_self));
    }
    out
}
