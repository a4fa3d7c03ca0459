//! In-memory ordered index over a designated token field.
//!
//! A small multi-way search tree keyed by the token value, each entry
//! carrying the owning document. Parents exclusively own their children;
//! traversal is top-down only. The tree is process-local and never
//! persisted: it is updated incrementally on create and must be rebuilt
//! from a collection scan after bulk mutation or a restart.

use crate::types::{Document, Value};

/// Fixed tree order: a node splits once it holds `ORDER - 1` keys.
pub const ORDER: usize = 3;

struct Node {
    keys: Vec<(Value, Document)>,
    children: Vec<Node>,
    leaf: bool,
}

impl Node {
    fn new(leaf: bool) -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
            leaf,
        }
    }

    fn is_full(&self, order: usize) -> bool {
        self.keys.len() == order - 1
    }
}

/// Outcome of a full index rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub indexed: usize,
    /// Documents without a usable token field, skipped but not fatal.
    pub skipped: usize,
}

pub struct BTree {
    root: Node,
    order: usize,
}

impl BTree {
    pub fn new(order: usize) -> Self {
        Self {
            root: Node::new(true),
            order: order.max(3),
        }
    }

    pub fn clear(&mut self) {
        self.root = Node::new(true);
    }

    /// Insert one token/document pair, splitting a full root preemptively
    /// so no split ever propagates upward more than one level.
    pub fn insert(&mut self, token: Value, document: Document) {
        if self.root.is_full(self.order) {
            let old_root = std::mem::replace(&mut self.root, Node::new(false));
            self.root.children.push(old_root);
            Self::split_child(&mut self.root, 0, self.order);
        }
        Self::insert_non_full(&mut self.root, token, document, self.order);
    }

    fn insert_non_full(node: &mut Node, token: Value, document: Document, order: usize) {
        if node.leaf {
            let pos = node.keys.partition_point(|(k, _)| *k <= token);
            node.keys.insert(pos, (token, document));
            return;
        }

        let mut child_index = node.keys.partition_point(|(k, _)| *k <= token);
        if node.children[child_index].is_full(order) {
            Self::split_child(node, child_index, order);
            if token > node.keys[child_index].0 {
                child_index += 1;
            }
        }
        Self::insert_non_full(&mut node.children[child_index], token, document, order);
    }

    /// Split the full child at `index`: the median key moves up into the
    /// parent and a new sibling takes the upper half of keys and children.
    fn split_child(parent: &mut Node, index: usize, order: usize) {
        let mid = (order - 1) / 2;
        let child = &mut parent.children[index];

        let mut sibling = Node::new(child.leaf);
        sibling.keys = child.keys.split_off(mid + 1);
        if !child.leaf {
            sibling.children = child.children.split_off(mid + 1);
        }
        let median = child
            .keys
            .pop()
            .expect("split is only called on a full child");

        parent.keys.insert(index, median);
        parent.children.insert(index + 1, sibling);
    }

    /// In-order walk: documents sorted by token, ascending.
    pub fn traverse(&self) -> Vec<Document> {
        let mut out = Vec::new();
        Self::walk(&self.root, &mut out);
        out
    }

    fn walk(node: &Node, out: &mut Vec<Document>) {
        for (i, (_, document)) in node.keys.iter().enumerate() {
            if !node.leaf {
                if let Some(child) = node.children.get(i) {
                    Self::walk(child, out);
                }
            }
            out.push(document.clone());
        }
        if !node.leaf && node.children.len() > node.keys.len() {
            Self::walk(&node.children[node.keys.len()], out);
        }
    }

    pub fn len(&self) -> usize {
        fn count(node: &Node) -> usize {
            node.keys.len() + node.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.keys.is_empty()
    }

    /// Discard the tree and reinsert every document carrying a usable token,
    /// in file order. Null and empty-string tokens are skipped.
    pub fn rebuild(&mut self, documents: &[Document], token_field: &str) -> RebuildReport {
        self.clear();
        let mut report = RebuildReport {
            indexed: 0,
            skipped: 0,
        };
        for document in documents {
            match document.get(token_field) {
                Some(token) if usable_token(token) => {
                    self.insert(token.clone(), document.clone());
                    report.indexed += 1;
                }
                _ => {
                    log::warn!("document has no usable '{}' token, skipped", token_field);
                    report.skipped += 1;
                }
            }
        }
        report
    }
}

/// A token is usable when present, non-null, and not an empty string.
pub fn usable_token(token: &Value) -> bool {
    match token {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn tokens_of(docs: &[Document]) -> Vec<Value> {
        docs.iter().map(|d| d.get("token").unwrap().clone()).collect()
    }

    #[test]
    fn traverse_is_sorted_for_sequential_inserts() {
        let mut tree = BTree::new(ORDER);
        for i in 0..50 {
            tree.insert(Value::Int(i), doc! { "token" => i });
        }
        let tokens = tokens_of(&tree.traverse());
        let mut sorted = tokens.clone();
        sorted.sort();
        assert_eq!(tokens, sorted);
        assert_eq!(tokens.len(), 50);
    }

    #[test]
    fn traverse_is_sorted_for_shuffled_inserts() {
        let mut tree = BTree::new(ORDER);
        // Deterministic scatter over 0..101.
        for i in 0..101i64 {
            let token = (i * 37) % 101;
            tree.insert(Value::Int(token), doc! { "token" => token });
        }
        let tokens = tokens_of(&tree.traverse());
        let mut sorted = tokens.clone();
        sorted.sort();
        assert_eq!(tokens, sorted);
        assert_eq!(tokens.len(), 101);
    }

    #[test]
    fn duplicate_tokens_are_kept() {
        let mut tree = BTree::new(ORDER);
        tree.insert(Value::Int(1), doc! { "token" => 1, "n" => "a" });
        tree.insert(Value::Int(1), doc! { "token" => 1, "n" => "b" });
        tree.insert(Value::Int(0), doc! { "token" => 0, "n" => "c" });
        assert_eq!(tree.len(), 3);
        let tokens = tokens_of(&tree.traverse());
        assert_eq!(tokens, vec![Value::Int(0), Value::Int(1), Value::Int(1)]);
    }

    #[test]
    fn string_tokens_sort_lexicographically() {
        let mut tree = BTree::new(ORDER);
        for name in ["pear", "apple", "orange", "banana", "kiwi"] {
            tree.insert(Value::from(name), doc! { "token" => name });
        }
        let tokens = tokens_of(&tree.traverse());
        assert_eq!(
            tokens,
            vec![
                Value::from("apple"),
                Value::from("banana"),
                Value::from("kiwi"),
                Value::from("orange"),
                Value::from("pear"),
            ]
        );
    }

    #[test]
    fn rebuild_skips_unusable_tokens() {
        let mut tree = BTree::new(ORDER);
        tree.insert(Value::Int(99), doc! { "token" => 99 });

        let documents = vec![
            doc! { "token" => "b" },
            doc! { "name" => "no token" },
            doc! { "token" => "" },
            doc! { "token" => "a" },
            doc! { "token" => Value::Null },
        ];
        let report = tree.rebuild(&documents, "token");
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 3);

        let tokens = tokens_of(&tree.traverse());
        assert_eq!(tokens, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let documents: Vec<Document> = (0..20)
            .map(|i| doc! { "token" => (i * 7) % 20 })
            .collect();
        let mut tree = BTree::new(ORDER);
        tree.rebuild(&documents, "token");
        let first = tokens_of(&tree.traverse());
        tree.rebuild(&documents, "token");
        let second = tokens_of(&tree.traverse());
        assert_eq!(first, second);
    }
}
