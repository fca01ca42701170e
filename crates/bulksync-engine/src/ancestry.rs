//! Bounded ancestor walks over parent chains.
//!
//! Source data is not trusted to be acyclic: a corrupt row can point at
//! itself or at one of its own descendants. The walk tracks visited ids and
//! stops at the first repeat, and never goes deeper than `max_depth`.

use std::collections::HashSet;

use tracing::warn;

/// Parent ids of `id`, nearest first.
///
/// `parent_of` returns `Ok(None)` for roots. The walk stops at a root, at a
/// self-reference, at the first already-visited id, or after `max_depth`
/// parents. Errors from `parent_of` end the walk and are returned.
pub fn collect_ancestors<F, E>(id: u64, max_depth: usize, mut parent_of: F) -> Result<Vec<u64>, E>
where
    F: FnMut(u64) -> Result<Option<u64>, E>,
{
    let mut ancestors = Vec::new();
    let mut visited = HashSet::from([id]);
    let mut current = id;

    while ancestors.len() < max_depth {
        let Some(parent) = parent_of(current)? else {
            break;
        };
        if !visited.insert(parent) {
            warn!(id = id, parent = parent, "Cycle in parent chain");
            break;
        }
        ancestors.push(parent);
        current = parent;
    }

    Ok(ancestors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::convert::Infallible;

    fn walk(parents: &[(u64, u64)], id: u64, max_depth: usize) -> Vec<u64> {
        let map: HashMap<u64, u64> = parents.iter().copied().collect();
        collect_ancestors(id, max_depth, |n| Ok::<_, Infallible>(map.get(&n).copied())).unwrap()
    }

    #[test]
    fn test_chain_nearest_first() {
        assert_eq!(walk(&[(4, 3), (3, 2), (2, 1)], 4, 64), vec![3, 2, 1]);
    }

    #[test]
    fn test_root_has_no_ancestors() {
        assert!(walk(&[(4, 3)], 3, 64).is_empty());
    }

    #[test]
    fn test_self_reference() {
        assert!(walk(&[(5, 5)], 5, 64).is_empty());
    }

    #[test]
    fn test_cycle_stops_at_repeat() {
        assert_eq!(walk(&[(1, 2), (2, 3), (3, 1)], 1, 64), vec![2, 3]);
    }

    #[test]
    fn test_depth_cap() {
        let chain: Vec<(u64, u64)> = (1..1000).map(|n| (n, n - 1)).collect();
        assert_eq!(walk(&chain, 999, 3), vec![998, 997, 996]);
        assert!(walk(&chain, 999, 0).is_empty());
    }

    #[test]
    fn test_error_propagates() {
        let result = collect_ancestors(7, 10, |n| {
            if n == 7 {
                Ok(Some(6))
            } else {
                Err(format!("row {} unreadable", n))
            }
        });
        assert_eq!(result, Err("row 6 unreadable".to_string()));
    }
}
