//! Per-request knowledge graph and entity heuristics for graph mode.
//!
//! The graph is a star: one query node connected to one node per retrieved
//! chunk, every edge weighted `1.0`. It is built fresh for each request and
//! dropped with it, so concurrent graph-mode requests never share state.

use std::collections::HashSet;

use petgraph::graph::{NodeIndex, UnGraph};

use crate::models::Chunk;

/// Characters of chunk text kept on a document node.
const SNIPPET_CHARS: usize = 200;
/// Upper bound on extracted entities.
const MAX_ENTITIES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Query { content: String },
    Document { id: String, snippet: String },
}

pub struct KnowledgeGraphView {
    graph: UnGraph<GraphNode, f32>,
    query: NodeIndex,
}

impl KnowledgeGraphView {
    pub fn build(query: &str, chunks: &[Chunk]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let query_node = graph.add_node(GraphNode::Query {
            content: query.to_string(),
        });
        for (i, chunk) in chunks.iter().enumerate() {
            let doc = graph.add_node(GraphNode::Document {
                id: format!("doc_{}", i),
                snippet: chunk.content.chars().take(SNIPPET_CHARS).collect(),
            });
            graph.add_edge(query_node, doc, 1.0);
        }
        Self {
            graph,
            query: query_node,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Document nodes linked to the query, in insertion order.
    pub fn documents(&self) -> Vec<&GraphNode> {
        let mut docs: Vec<(NodeIndex, &GraphNode)> = self
            .graph
            .neighbors(self.query)
            .map(|n| (n, &self.graph[n]))
            .collect();
        docs.sort_by_key(|(n, _)| n.index());
        docs.into_iter().map(|(_, node)| node).collect()
    }
}

/// Capitalized tokens longer than five characters from the query and the
/// chunk texts, stripped of surrounding punctuation, de-duplicated in
/// first-seen order and capped at ten.
pub fn extract_entities(query: &str, chunks: &[Chunk]) -> Vec<String> {
    let texts = std::iter::once(query).chain(chunks.iter().map(|c| c.content.as_str()));

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for token in texts.flat_map(str::split_whitespace) {
        if token.chars().count() <= 5 || !token.chars().next().is_some_and(char::is_uppercase) {
            continue;
        }
        let entity = token.trim_matches(|c: char| ".,;:()[]".contains(c));
        if entity.is_empty() || !seen.insert(entity.to_string()) {
            continue;
        }
        entities.push(entity.to_string());
        if entities.len() == MAX_ENTITIES {
            break;
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(text, "notes.txt", None, ChunkKind::Text, 0)
    }

    #[test]
    fn entities_require_length_and_capital() {
        let entities = extract_entities("Alice met Bob-2024 at Yellowstone.", &[]);
        assert!(entities.contains(&"Yellowstone".to_string()));
        assert!(!entities.iter().any(|e| e == "Alice" || e == "met" || e == "at"));
    }

    #[test]
    fn entities_are_deduplicated_in_order_and_capped() {
        let chunks = [chunk("(Kubernetes) schedules Containers; Kubernetes again.")];
        let entities = extract_entities("Explain Kubernetes networking", &chunks);
        assert_eq!(entities, vec!["Explain", "Kubernetes", "Containers"]);

        let many: String = (0..15).map(|i| format!("Entity{:02} ", i)).collect();
        assert_eq!(extract_entities(&many, &[]).len(), 10);
    }

    #[test]
    fn star_graph_links_query_to_each_chunk() {
        let long = "x".repeat(500);
        let chunks = [chunk("first"), chunk(&long)];
        let view = KnowledgeGraphView::build("question", &chunks);
        assert_eq!(view.node_count(), 3);
        assert_eq!(view.edge_count(), 2);

        let docs = view.documents();
        assert_eq!(docs.len(), 2);
        match docs[1] {
            GraphNode::Document { id, snippet } => {
                assert_eq!(id, "doc_1");
                assert_eq!(snippet.len(), 200);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn empty_retrieval_gives_lone_query_node() {
        let view = KnowledgeGraphView::build("q", &[]);
        assert_eq!(view.node_count(), 1);
        assert!(view.documents().is_empty());
    }
}
