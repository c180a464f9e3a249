//! Content projection: bucket light-DOM children into slots.
//!
//! Each slot declares a selector string; a node lands in the first bucket
//! whose selector matches it. The wildcard slot, if declared, collects
//! everything that matched nothing more specific. A node matching nothing,
//! with no wildcard declared, is not projected at all.

use crate::dom::NodeHandle;
use crate::error::BridgeError;
use crate::selector::{CssSelector, SelectorMatcher};

/// Group `nodes` into one bucket per entry of `selectors`.
pub fn group_nodes_by_selector(
    selectors: &[String],
    nodes: &[NodeHandle],
) -> Result<Vec<Vec<NodeHandle>>, BridgeError> {
    let mut buckets: Vec<Vec<NodeHandle>> = selectors.iter().map(|_| Vec::new()).collect();
    let mut matcher: SelectorMatcher<usize> = SelectorMatcher::new();
    let mut wildcard_index: Option<usize> = None;

    for (index, selector) in selectors.iter().enumerate() {
        if selector.trim() == "*" {
            wildcard_index = Some(index);
        } else {
            matcher.add_selectables(CssSelector::parse(selector)?, index);
        }
    }

    for node in nodes {
        let mut indices: Vec<usize> = Vec::new();

        if let Some(tag) = node.tag() {
            let candidate = CssSelector::for_element(tag, &node.attributes());
            matcher.match_candidate(
                &candidate,
                Some(&mut |_selector: &CssSelector, index: &usize| indices.push(*index)),
            );
            indices.sort_unstable();
            indices.dedup();
        }

        // Specific slots take priority; the wildcard always sorts last.
        if let Some(wildcard) = wildcard_index {
            indices.push(wildcard);
        }

        if let Some(first) = indices.first() {
            buckets[*first].push(node.clone());
        }
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::BridgeNode;

    #[test]
    fn test_specific_slot_wins_over_wildcard() {
        let selectors = vec!["a".to_string(), "*".to_string()];
        let anchor = BridgeNode::new_element("a");
        let para = BridgeNode::new_element("p");

        let buckets = group_nodes_by_selector(&selectors, &[anchor, para]).unwrap();
        assert_eq!(buckets[0].len(), 1);
        assert_eq!(buckets[0][0].tag(), Some("a"));
        assert_eq!(buckets[1].len(), 1);
        assert_eq!(buckets[1][0].tag(), Some("p"));
    }

    #[test]
    fn test_unmatched_node_without_wildcard_is_dropped() {
        let selectors = vec!["a".to_string(), "b".to_string()];
        let para = BridgeNode::new_element("p");

        let buckets = group_nodes_by_selector(&selectors, &[para]).unwrap();
        assert!(buckets[0].is_empty());
        assert!(buckets[1].is_empty());
    }

    #[test]
    fn test_node_matching_several_slots_takes_the_first() {
        let selectors = vec![".first".to_string(), "div".to_string()];
        let node = BridgeNode::new_element_with_attrs("div", &[("class", "first")]);

        let buckets = group_nodes_by_selector(&selectors, &[node]).unwrap();
        assert_eq!(buckets[0].len(), 1);
        assert!(buckets[1].is_empty());
    }

    #[test]
    fn test_class_attribute_explodes_into_predicates() {
        let selectors = vec!["span.note".to_string(), "*".to_string()];
        let hit = BridgeNode::new_element_with_attrs("span", &[("class", "big note")]);
        let miss = BridgeNode::new_element_with_attrs("span", &[("class", "big")]);

        let buckets = group_nodes_by_selector(&selectors, &[hit, miss]).unwrap();
        assert_eq!(buckets[0].len(), 1);
        assert_eq!(buckets[1].len(), 1);
    }

    #[test]
    fn test_text_node_goes_to_wildcard_only() {
        let selectors = vec!["a".to_string(), "*".to_string()];
        let text = BridgeNode::new_text("loose text");

        let buckets = group_nodes_by_selector(&selectors, &[text]).unwrap();
        assert!(buckets[0].is_empty());
        assert_eq!(buckets[1].len(), 1);
    }
}
