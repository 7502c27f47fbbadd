//! Compact-edge radix trie over `String` keys.
//!
//! Grounded on `firework/util/_trie.py`'s `RadixTrie`: edges are themselves
//! multi-character strings (not single characters), split on insert when a
//! new key diverges partway through an edge, and merged back on remove when
//! a node is left with exactly one child and no value of its own. Ordering
//! of `keys`/`values`/`items` is unspecified (stack-based DFS, not
//! lexicographic) — nothing in the analyzer depends on it.

use std::collections::HashMap;

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

struct Node<T> {
    value: Option<T>,
    children: HashMap<String, Node<T>>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self { value: None, children: HashMap::new() }
    }
}

pub struct RadixTrie<T> {
    root: Node<T>,
}

impl<T> Default for RadixTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RadixTrie<T> {
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    pub fn set(&mut self, key: &str, value: T) {
        let mut node = &mut self.root;
        let mut i = 0;

        loop {
            let rest = &key[i..];
            let matched_edge = node
                .children
                .keys()
                .find(|edge| common_prefix_len(edge, rest) > 0)
                .cloned();

            let Some(edge) = matched_edge else {
                let leaf = node.children.entry(rest.to_string()).or_insert_with(Node::new);
                leaf.value = Some(value);
                return;
            };

            let length = common_prefix_len(&edge, rest);

            if length < edge.chars().count() {
                let split_at = edge.char_indices().nth(length).map(|(b, _)| b).unwrap_or(edge.len());
                let prefix = edge[..split_at].to_string();
                let suffix = edge[split_at..].to_string();

                let child = node.children.remove(&edge).expect("edge just matched");
                let mut mid = Node::new();
                mid.children.insert(suffix, child);
                node.children.insert(prefix.clone(), mid);
                node = node.children.get_mut(&prefix).expect("just inserted");
            } else {
                node = node.children.get_mut(&edge).expect("edge just matched");
            }

            i += length;

            if i == key.len() {
                node.value = Some(value);
                return;
            }
        }
    }

    pub fn remove(&mut self, key: &str) {
        let mut path: Vec<String> = Vec::new();
        let mut node = &self.root;
        let mut i = 0;

        loop {
            let rest = &key[i..];

            let found = node.children.iter().find(|(edge, _)| {
                let length = common_prefix_len(edge, rest);
                length == edge.chars().count() && i + length <= key.len()
            });

            let Some((edge, child)) = found else { return };

            path.push(edge.clone());
            i += edge.chars().count();
            node = child;

            if i == key.len() {
                break;
            }
        }

        if node.value.is_none() {
            return;
        }

        self.remove_with_path(&path);
    }

    fn remove_with_path(&mut self, path: &[String]) {
        fn walk<'a, T>(node: &'a mut Node<T>, path: &[String]) -> &'a mut Node<T> {
            match path.first() {
                Some(edge) => walk(node.children.get_mut(edge).expect("path is valid"), &path[1..]),
                None => node,
            }
        }

        let target = walk(&mut self.root, path);
        target.value = None;

        for depth in (0..path.len()).rev() {
            let parent = walk(&mut self.root, &path[..depth]);
            let edge = &path[depth];
            let child = parent.children.get(edge).expect("path is valid");

            if child.value.is_some() {
                break;
            }

            if child.children.len() == 1 {
                let (child_edge, _) = child.children.iter().next().expect("len == 1");
                let child_edge = child_edge.clone();
                let mut child = parent.children.remove(edge).expect("just checked");
                let grandchild = child.children.remove(&child_edge).expect("just matched");
                parent.children.insert(format!("{edge}{child_edge}"), grandchild);
            } else if child.children.is_empty() {
                parent.children.remove(edge);
            } else {
                break;
            }
        }
    }

    pub fn longest_prefix_key(&self, prefix: &str) -> Option<String> {
        let mut node = &self.root;
        let mut i = 0;
        let mut matched_key = String::new();
        let mut last_key: Option<String> = None;

        while i < prefix.len() {
            let rest = &prefix[i..];
            let found = node.children.iter().find(|(edge, _)| common_prefix_len(edge, rest) > 0);

            let Some((edge, child)) = found else { break };
            let length = common_prefix_len(edge, rest);

            if length < edge.chars().count() {
                break;
            }

            matched_key.push_str(edge);
            i += length;
            node = child;

            if node.value.is_some() {
                last_key = Some(matched_key.clone());
            }
        }

        last_key
    }

    pub fn contains(&self, key: &str) -> bool {
        let mut node = &self.root;
        let mut i = 0;

        while i < key.len() {
            let rest = &key[i..];
            let found = node
                .children
                .iter()
                .find(|(edge, _)| common_prefix_len(edge, rest) == edge.chars().count());

            let Some((edge, child)) = found else { return false };
            i += edge.chars().count();
            node = child;
        }

        node.value.is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<&T> {
        self.items().into_iter().map(|(_, v)| v).collect()
    }

    pub fn items(&self) -> Vec<(String, &T)> {
        let mut out = Vec::new();
        let mut stack: Vec<(&Node<T>, String)> = vec![(&self.root, String::new())];

        while let Some((node, prefix)) = stack.pop() {
            if let Some(value) = &node.value {
                out.push((prefix.clone(), value));
            }
            for (edge, child) in &node.children {
                stack.push((child, format!("{prefix}{edge}")));
            }
        }

        out
    }

    pub fn update(&mut self, items: impl IntoIterator<Item = (String, T)>) {
        for (key, value) in items {
            self.set(&key, value);
        }
    }
}
