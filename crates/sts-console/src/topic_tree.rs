//! MQTT topic tree.
//!
//! Every message contributes the path `topic.split('/') ++ [payload]`. Nodes
//! are keyed by name within their parent and carry a stable id derived from
//! the lower-cased path that leads to them, so ids survive rebuilds and
//! expansion state keyed by id stays valid as new messages arrive.

use std::collections::HashSet;

use sha1::{Digest, Sha1};
use sts_client::MqttMessage;

/// Levels expanded before the user touches anything.
pub const DEFAULT_EXPANDED_DEPTH: usize = 3;

/// One node of the topic tree. Leaves are payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNode {
    /// Stable id (hex SHA-1 of the lower-cased path).
    pub id: String,
    /// Topic segment or payload.
    pub name: String,
    /// Children in first-seen order.
    pub children: Vec<TopicNode>,
}

impl TopicNode {
    /// Whether the node has children.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Id of the node reached through `segments`.
pub fn node_id<S: AsRef<str>>(segments: &[S]) -> String {
    let path = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase();
    hex::encode(Sha1::digest(path.as_bytes()))
}

/// Build the forest for a set of messages.
///
/// Siblings are matched by exact name; two segments differing only in case
/// become separate nodes that share an id.
pub fn build_tree<'a, I>(messages: I) -> Vec<TopicNode>
where
    I: IntoIterator<Item = &'a MqttMessage>,
{
    let mut roots = Vec::new();
    for message in messages {
        insert_path(&mut roots, message.topic.split('/').chain([message.payload.as_str()]));
    }
    roots
}

fn insert_path<'s>(roots: &mut Vec<TopicNode>, segments: impl Iterator<Item = &'s str>) {
    let mut level = roots;
    let mut path: Vec<&str> = Vec::new();
    for segment in segments {
        path.push(segment);
        let current = level;
        let index = match current.iter().position(|node| node.name == segment) {
            Some(index) => index,
            None => {
                current.push(TopicNode {
                    id: node_id(&path),
                    name: segment.to_string(),
                    children: Vec::new(),
                });
                current.len() - 1
            }
        };
        level = &mut current[index].children;
    }
}

/// Ids of all nodes with children at depth `< max_depth` (roots are depth 0).
pub fn default_expanded(roots: &[TopicNode], max_depth: usize) -> HashSet<String> {
    fn walk(nodes: &[TopicNode], depth: usize, max_depth: usize, out: &mut HashSet<String>) {
        if depth >= max_depth {
            return;
        }
        for node in nodes.iter().filter(|node| node.has_children()) {
            out.insert(node.id.clone());
            walk(&node.children, depth + 1, max_depth, out);
        }
    }

    let mut expanded = HashSet::new();
    walk(roots, 0, max_depth, &mut expanded);
    expanded
}

/// Which set decides expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Expansion {
    /// Follow the depth-based default, recomputed on every rebuild.
    #[default]
    Default,
    /// The user has toggled something; this set is authoritative from now on.
    Overridden(HashSet<String>),
}

/// A visible row of the flattened tree.
#[derive(Debug, Clone, Copy)]
pub struct TopicRow<'a> {
    /// The node.
    pub node: &'a TopicNode,
    /// Nesting depth, roots at 0.
    pub depth: usize,
    /// Whether the node's children are shown.
    pub expanded: bool,
}

/// Tree plus cursor and expansion state for the MQTT view.
#[derive(Debug, Default)]
pub struct TopicTreeState {
    roots: Vec<TopicNode>,
    defaults: HashSet<String>,
    expansion: Expansion,
    cursor: usize,
}

impl TopicTreeState {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the current message history.
    pub fn rebuild<'a, I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = &'a MqttMessage>,
    {
        self.roots = build_tree(messages);
        self.defaults = default_expanded(&self.roots, DEFAULT_EXPANDED_DEPTH);
        let visible = self.visible_rows().len();
        self.cursor = self.cursor.min(visible.saturating_sub(1));
    }

    /// Root nodes.
    pub fn roots(&self) -> &[TopicNode] {
        &self.roots
    }

    /// Current expansion mode.
    pub const fn expansion(&self) -> &Expansion {
        &self.expansion
    }

    /// Whether a node is expanded.
    pub fn is_expanded(&self, id: &str) -> bool {
        match &self.expansion {
            Expansion::Default => self.defaults.contains(id),
            Expansion::Overridden(set) => set.contains(id),
        }
    }

    /// Flip one node. The first toggle snapshots the defaults into an
    /// overridden set.
    pub fn toggle(&mut self, id: &str) {
        if self.expansion == Expansion::Default {
            self.expansion = Expansion::Overridden(self.defaults.clone());
        }
        if let Expansion::Overridden(set) = &mut self.expansion {
            if !set.remove(id) {
                set.insert(id.to_string());
            }
        }
    }

    /// Toggle the node under the cursor.
    pub fn toggle_selected(&mut self) {
        let id = self
            .visible_rows()
            .get(self.cursor)
            .filter(|row| row.node.has_children())
            .map(|row| row.node.id.clone());
        if let Some(id) = id {
            self.toggle(&id);
        }
    }

    /// Depth-first list of rows whose ancestors are all expanded.
    pub fn visible_rows(&self) -> Vec<TopicRow<'_>> {
        fn walk<'a>(
            state: &TopicTreeState,
            nodes: &'a [TopicNode],
            depth: usize,
            out: &mut Vec<TopicRow<'a>>,
        ) {
            for node in nodes {
                let expanded = node.has_children() && state.is_expanded(&node.id);
                out.push(TopicRow { node, depth, expanded });
                if expanded {
                    walk(state, &node.children, depth + 1, out);
                }
            }
        }

        let mut rows = Vec::new();
        walk(self, &self.roots, 0, &mut rows);
        rows
    }

    /// Cursor position within [`Self::visible_rows`].
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor up.
    pub fn select_prev(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move the cursor down.
    pub fn select_next(&mut self) {
        let visible = self.visible_rows().len();
        if self.cursor + 1 < visible {
            self.cursor += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(topic: &str, payload: &str) -> MqttMessage {
        MqttMessage::new(topic, payload)
    }

    #[test]
    fn builds_shared_prefixes() {
        let messages = [msg("a/b", "x"), msg("a/c", "y")];
        let roots = build_tree(&messages);

        assert_eq!(roots.len(), 1);
        let a = &roots[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.children.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(a.children[0].children[0].name, "x");
        assert_eq!(a.children[1].children[0].name, "y");
        assert_eq!(a.children[0].children[0].id, node_id(&["a", "b", "x"]));
    }

    #[test]
    fn single_segment_topic() {
        let messages = [msg("t", "1"), msg("t", "1"), msg("t", "2")];
        let roots = build_tree(&messages);

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].children.len(), 2);
        let defaults = default_expanded(&roots, DEFAULT_EXPANDED_DEPTH);
        assert!(defaults.contains(&roots[0].id));
        assert_eq!(defaults.len(), 1);
    }

    #[test]
    fn ids_are_case_insensitive_and_stable() {
        assert_eq!(node_id(&["Home", "Temp"]), node_id(&["home", "temp"]));
        assert_ne!(node_id(&["home", "temp"]), node_id(&["home"]));
        assert_eq!(node_id(&["a"]).len(), 40);

        let first = build_tree(&[msg("Home/Temp", "20")]);
        let second = build_tree(&[msg("other", "1"), msg("Home/Temp", "20")]);
        assert_eq!(first[0].id, second[1].id);
    }

    #[test]
    fn case_variants_are_distinct_nodes_with_equal_ids() {
        let roots = build_tree(&[msg("Home", "1"), msg("home", "1")]);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].id, roots[1].id);
    }

    #[test]
    fn empty_segments_are_kept() {
        let roots = build_tree(&[msg("/a", "1")]);
        assert_eq!(roots[0].name, "");
        assert_eq!(roots[0].children[0].name, "a");
    }

    #[test]
    fn default_expansion_stops_at_depth() {
        let roots = build_tree(&[msg("a/b/c/d", "p")]);
        let defaults = default_expanded(&roots, 3);
        let a = &roots[0];
        let b = &a.children[0];
        let c = &b.children[0];
        let d = &c.children[0];
        assert!(defaults.contains(&a.id));
        assert!(defaults.contains(&b.id));
        assert!(defaults.contains(&c.id));
        assert!(!defaults.contains(&d.id));
    }

    #[test]
    fn toggle_overrides_defaults_permanently() {
        let mut state = TopicTreeState::new();
        let messages = vec![msg("a/b", "x")];
        state.rebuild(&messages);
        assert_eq!(state.expansion(), &Expansion::Default);
        assert_eq!(state.visible_rows().len(), 3);

        let root = state.roots()[0].id.clone();
        state.toggle(&root);
        assert!(matches!(state.expansion(), Expansion::Overridden(_)));
        assert_eq!(state.visible_rows().len(), 1);

        let more = vec![msg("a/b", "x"), msg("z/y", "w")];
        state.rebuild(&more);
        assert!(!state.is_expanded(&root));
        // z was never expanded by the user, so it stays closed
        assert_eq!(state.visible_rows().len(), 2);
    }

    #[test]
    fn cursor_navigation_and_toggle_selected() {
        let mut state = TopicTreeState::new();
        let messages = vec![msg("a", "1"), msg("b", "2")];
        state.rebuild(&messages);
        let names: Vec<_> = state.visible_rows().iter().map(|r| r.node.name.clone()).collect();
        assert_eq!(names, vec!["a", "1", "b", "2"]);

        state.select_next();
        state.select_next();
        assert_eq!(state.cursor(), 2);
        state.toggle_selected();
        assert_eq!(state.visible_rows().len(), 3);

        for _ in 0..10 {
            state.select_next();
        }
        assert_eq!(state.cursor(), 2);
        state.select_prev();
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn rebuild_clamps_cursor() {
        let mut state = TopicTreeState::new();
        let messages = vec![msg("a/b/c", "1")];
        state.rebuild(&messages);
        for _ in 0..3 {
            state.select_next();
        }
        assert_eq!(state.cursor(), 3);
        state.rebuild(std::iter::empty());
        assert_eq!(state.cursor(), 0);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-cA-C]{1,2}"
    }

    fn topics(count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<(Vec<String>, String)>> {
        proptest::collection::vec((proptest::collection::vec(segment(), 1..4), segment()), count)
    }

    proptest! {
        #[test]
        fn every_message_has_a_path(
            raw in topics(1..20)
        ) {
            let messages: Vec<MqttMessage> = raw
                .iter()
                .map(|(segments, payload)| msg(&segments.join("/"), payload))
                .collect();
            let roots = build_tree(&messages);

            for message in &messages {
                let mut level = &roots;
                let mut path = Vec::new();
                for segment in message.topic.split('/').chain([message.payload.as_str()]) {
                    path.push(segment);
                    let node = level.iter().find(|n| n.name == segment);
                    prop_assert!(node.is_some());
                    let node = node.unwrap();
                    prop_assert_eq!(&node.id, &node_id(&path));
                    level = &node.children;
                }
            }
        }

        #[test]
        fn siblings_have_unique_names(
            raw in topics(0..20)
        ) {
            let messages: Vec<MqttMessage> = raw
                .iter()
                .map(|(segments, payload)| msg(&segments.join("/"), payload))
                .collect();
            let roots = build_tree(&messages);
            fn check(nodes: &[TopicNode]) -> bool {
                let names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
                names.len() == nodes.len() && nodes.iter().all(|n| check(&n.children))
            }
            prop_assert!(check(&roots));
        }
    }
}
