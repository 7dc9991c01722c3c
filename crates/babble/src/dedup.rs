#![forbid(unsafe_code)]

use std::collections::HashMap;

use tokenize::TokenId;

#[derive(Default)]
struct Node {
    children: HashMap<TokenId, usize>,
    terminal: bool,
}

/// Prefix tree over id sequences, used to drop repeated productions.
///
/// Nodes live in one arena; a node is marked terminal when a whole
/// sequence ends on it, so a production that is a strict prefix of another
/// still counts as distinct.
pub struct ProductionTrie {
    nodes: Vec<Node>,
}

impl Default for ProductionTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionTrie {
    /// Empty tree with just the root.
    pub fn new() -> Self {
        Self { nodes: vec![Node::default()] }
    }

    /// Add `sequence`. Returns false if it was already present.
    pub fn insert(&mut self, sequence: &[TokenId]) -> bool {
        let mut at = 0;
        for id in sequence {
            let existing = self.nodes.get(at).and_then(|n| n.children.get(id).copied());
            at = match existing {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    if let Some(node) = self.nodes.get_mut(at) {
                        node.children.insert(*id, next);
                    }
                    next
                }
            };
        }
        match self.nodes.get_mut(at) {
            Some(node) if !node.terminal => {
                node.terminal = true;
                true
            }
            _ => false,
        }
    }

    /// True if `sequence` was inserted before.
    pub fn contains(&self, sequence: &[TokenId]) -> bool {
        let mut at = 0;
        for id in sequence {
            match self.nodes.get(at).and_then(|n| n.children.get(id)) {
                Some(next) => at = *next,
                None => return false,
            }
        }
        self.nodes.get(at).map(|n| n.terminal).unwrap_or(false)
    }
}

/// Keep the first occurrence of every distinct production, in input order.
pub fn dedup(productions: Vec<Vec<TokenId>>) -> Vec<Vec<TokenId>> {
    let mut seen = ProductionTrie::new();
    productions.into_iter().filter(|p| seen.insert(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_sequences_collapse() {
        let out = dedup(vec![vec![1, 2, 3], vec![1, 2, 3]]);
        assert_eq!(out, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn prefixes_are_distinct() {
        let mut trie = ProductionTrie::new();
        assert!(trie.insert(&[1, 2, 3]));
        assert!(!trie.contains(&[1, 2]));
        assert!(trie.insert(&[1, 2]));
        assert!(!trie.insert(&[1, 2]));
        assert!(trie.contains(&[1, 2, 3]));
        assert!(!trie.contains(&[1, 2, 3, 4]));
    }

    proptest! {
        #[test]
        fn dedup_matches_first_seen_order(seqs in proptest::collection::vec(proptest::collection::vec(0i32..4, 0..4), 0..30)) {
            let mut expected: Vec<Vec<TokenId>> = Vec::new();
            for s in &seqs {
                if !expected.contains(s) {
                    expected.push(s.clone());
                }
            }
            prop_assert_eq!(dedup(seqs), expected);
        }
    }
}
