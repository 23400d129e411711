//! Keyword/title co-occurrence graph
//!
//! Built from a set of neighbor posts: each keyword is linked to the titles
//! of the posts carrying it, and only keywords shared by at least two
//! distinct titles survive. The result is bipartite; keyword nodes never
//! link to each other, and neither do title nodes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::core::model::Post;

/// Keywords need this many distinct titles to appear in the graph
pub const MIN_SHARED_TITLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Keyword,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Keyword text or full post title
    pub name: String,
    /// Display label; titles are word-wrapped
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CooccurrenceGraph {
    pub nodes: Vec<Node>,
    /// Undirected keyword-title edges as node indices
    pub edges: Vec<(usize, usize)>,
}

impl CooccurrenceGraph {
    pub fn from_posts<'a>(posts: impl IntoIterator<Item = &'a Post>, wrap_width: usize) -> Self {
        let mut titles_by_keyword: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for post in posts {
            for keyword in &post.keywords {
                titles_by_keyword
                    .entry(keyword.as_str())
                    .or_default()
                    .insert(post.title.as_str());
            }
        }
        titles_by_keyword.retain(|_, titles| titles.len() >= MIN_SHARED_TITLES);

        let titles: BTreeSet<&str> = titles_by_keyword.values().flatten().copied().collect();

        let mut nodes = Vec::with_capacity(titles_by_keyword.len() + titles.len());
        let mut keyword_index = BTreeMap::new();
        for keyword in titles_by_keyword.keys() {
            keyword_index.insert(*keyword, nodes.len());
            nodes.push(Node {
                kind: NodeKind::Keyword,
                name: keyword.to_string(),
                label: keyword.to_string(),
            });
        }
        let mut title_index = BTreeMap::new();
        for title in &titles {
            title_index.insert(*title, nodes.len());
            nodes.push(Node {
                kind: NodeKind::Title,
                name: title.to_string(),
                label: wrap_title(title, wrap_width),
            });
        }

        let mut edges = Vec::new();
        for (keyword, related) in &titles_by_keyword {
            for title in related {
                edges.push((keyword_index[keyword], title_index[title]));
            }
        }

        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Names of the nodes adjacent to the node called `name`.
    pub fn neighbors(&self, name: &str) -> BTreeSet<&str> {
        let Some(idx) = self.nodes.iter().position(|n| n.name == name) else {
            return BTreeSet::new();
        };
        self.edges
            .iter()
            .filter_map(|&(a, b)| match (a == idx, b == idx) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .map(|i| self.nodes[i].name.as_str())
            .collect()
    }
}

/// Greedy word wrap by display width, joining lines with `\n`. Words wider
/// than `width` are broken across lines.
pub fn wrap_title(title: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in title.split_whitespace() {
        let mut word = word.to_string();
        loop {
            let sep = if current.is_empty() { 0 } else { 1 };
            if current.width() + sep + word.width() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(&word);
                break;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            // Word alone is too wide: emit a full-width chunk
            let (head, tail) = split_at_width(&word, width);
            lines.push(head);
            word = tail;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

fn split_at_width(word: &str, width: usize) -> (String, String) {
    let mut used = 0;
    let mut split = word.len();
    for (idx, c) in word.char_indices() {
        let w = c.width().unwrap_or(0);
        if used + w > width && idx > 0 {
            split = idx;
            break;
        }
        used += w;
    }
    (word[..split].to_string(), word[split..].to_string())
}
