use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::parsed::{FallbackReason, Parsed};
use crate::schema::{Graph, GraphEdge, GraphNode};

/// Parse a concept graph out of free-form model output.
///
/// Only the first balanced `{...}` span is considered, so prose around the
/// JSON is ignored. Invalid nodes and edges are dropped individually; if no
/// node or no edge survives, the canonical empty graph is returned instead
/// of a partial one.
pub fn parse_graph(raw: &str) -> Parsed<Graph> {
    let Some(span) = first_json_object(raw) else {
        warn!("No JSON object found in graph response");
        return Parsed::fallback(Graph::empty(), FallbackReason::NoJsonObject);
    };

    let data = match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(data)) => data,
        Ok(_) => return Parsed::fallback(Graph::empty(), FallbackReason::MalformedJson),
        Err(e) => {
            warn!(error = %e, "Failed to parse graph JSON");
            return Parsed::fallback(Graph::empty(), FallbackReason::MalformedJson);
        }
    };

    let (Some(raw_nodes), Some(raw_links)) = (array_field(&data, "nodes"), links_field(&data)) else {
        warn!("Graph JSON is missing nodes or links array");
        return Parsed::fallback(Graph::empty(), FallbackReason::MissingArrays);
    };

    let mut seen = HashSet::new();
    let nodes: Vec<GraphNode> = raw_nodes
        .iter()
        .filter_map(graph_node)
        .filter(|n| seen.insert(n.id.clone()))
        .collect();

    if nodes.is_empty() {
        return Parsed::fallback(Graph::empty(), FallbackReason::NoValidNodes);
    }

    let mut unique = HashSet::new();
    let links: Vec<GraphEdge> = raw_links
        .iter()
        .filter_map(graph_edge)
        .filter(|e| seen.contains(&e.source) && seen.contains(&e.target))
        .filter(|e| unique.insert(e.clone()))
        .collect();

    if links.is_empty() {
        return Parsed::fallback(Graph::empty(), FallbackReason::NoValidEdges);
    }

    debug!(
        nodes = nodes.len(),
        links = links.len(),
        dropped_nodes = raw_nodes.len() - nodes.len(),
        dropped_links = raw_links.len() - links.len(),
        "Parsed concept graph"
    );

    Parsed::Value(Graph { nodes, links })
}

fn array_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    data.get(key).and_then(Value::as_array)
}

fn links_field(data: &Map<String, Value>) -> Option<&Vec<Value>> {
    array_field(data, "links").or_else(|| array_field(data, "edges"))
}

/// `id` is a non-empty string, `name` a string, and `val` (or `weight`) a number.
fn graph_node(item: &Value) -> Option<GraphNode> {
    let id = item.get("id")?.as_str().filter(|s| !s.is_empty())?;
    let name = item.get("name")?.as_str()?;
    let weight = item.get("val").or_else(|| item.get("weight"))?.as_f64()?;

    Some(GraphNode {
        id: id.to_string(),
        name: name.to_string(),
        weight,
    })
}

fn graph_edge(item: &Value) -> Option<GraphEdge> {
    let source = item.get("source")?.as_str()?;
    let target = item.get("target")?.as_str()?;

    Some(GraphEdge {
        source: source.to_string(),
        target: target.to_string(),
    })
}

/// First brace-balanced `{...}` span, skipping braces inside JSON strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIND_MAP: &str = r#"{
      "nodes": [
        { "id": "1", "name": "Main Topic", "val": 20 },
        { "id": "2", "name": "Key Subtopic 1", "val": 15 },
        { "id": "3", "name": "Specific Concept 1.1", "val": 12 }
      ],
      "links": [
        { "source": "1", "target": "2" },
        { "source": "2", "target": "3" }
      ]
    }"#;

    #[test]
    fn test_well_formed_graph() {
        let parsed = parse_graph(MIND_MAP);
        assert!(!parsed.is_fallback());

        let graph = parsed.into_value();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.nodes[0].weight, 20.0);
    }

    #[test]
    fn test_dangling_edge_empties_the_whole_graph() {
        let raw = r#"{"nodes":[{"id":"1","name":"A","val":20}],"links":[{"source":"1","target":"9"}]}"#;
        let parsed = parse_graph(raw);

        assert_eq!(parsed.value(), &Graph::empty());
        assert_eq!(parsed.fallback_reason(), Some(FallbackReason::NoValidEdges));
    }

    #[test]
    fn test_prose_around_json_is_ignored() {
        let raw = format!("Here is the map: {} Thanks! {{not json}}", MIND_MAP);
        let graph = parse_graph(&raw).into_value();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links[1], GraphEdge { source: "2".into(), target: "3".into() });
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_the_span() {
        let raw = r#"Map: {"nodes":[{"id":"1","name":"set {A}","val":1},{"id":"2","name":"\"}\"","val":2}],
            "links":[{"source":"1","target":"2"}]} trailing }"#;
        let graph = parse_graph(raw).into_value();
        assert_eq!(graph.nodes[0].name, "set {A}");
        assert_eq!(graph.nodes[1].name, "\"}\"");
    }

    #[test]
    fn test_invalid_nodes_are_dropped_and_edges_filtered_against_survivors() {
        let raw = r#"{
          "nodes": [
            {"id": "1", "name": "Root", "val": 20},
            {"id": "", "name": "No id", "val": 10},
            {"id": "3", "name": "String weight", "val": "12"},
            {"id": 4, "name": "Numeric id", "val": 10},
            {"id": "5", "name": "Leaf", "weight": 10},
            {"id": "1", "name": "Duplicate", "val": 1}
          ],
          "links": [
            {"source": "1", "target": "5"},
            {"source": "1", "target": "3"},
            {"source": 1, "target": "5"},
            {"source": "1", "target": "5"}
          ]
        }"#;
        let graph = parse_graph(raw).into_value();

        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "5"]);
        assert_eq!(graph.nodes[0].name, "Root");
        assert_eq!(graph.links, vec![GraphEdge { source: "1".into(), target: "5".into() }]);
    }

    #[test]
    fn test_edges_key_is_accepted() {
        let raw = r#"{"nodes":[{"id":"a","name":"A","val":1},{"id":"b","name":"B","val":1}],
                      "edges":[{"source":"a","target":"b"}]}"#;
        assert_eq!(parse_graph(raw).value().links.len(), 1);
    }

    #[test]
    fn test_fallback_reasons() {
        assert_eq!(
            parse_graph("no structure here").fallback_reason(),
            Some(FallbackReason::NoJsonObject)
        );
        assert_eq!(
            parse_graph("{\"nodes\": [").fallback_reason(),
            Some(FallbackReason::NoJsonObject)
        );
        assert_eq!(
            parse_graph("{\"nodes\": [ }").fallback_reason(),
            Some(FallbackReason::MalformedJson)
        );
        assert_eq!(
            parse_graph("{nodes: []}").fallback_reason(),
            Some(FallbackReason::MalformedJson)
        );
        assert_eq!(
            parse_graph(r#"{"nodes": [], "links": {}}"#).fallback_reason(),
            Some(FallbackReason::MissingArrays)
        );
        assert_eq!(
            parse_graph(r#"{"nodes": [{"id":"1"}], "links": []}"#).fallback_reason(),
            Some(FallbackReason::NoValidNodes)
        );
    }

    #[test]
    fn test_small_graphs_are_not_rejected() {
        let raw = r#"{"nodes":[{"id":"1","name":"A","val":20},{"id":"2","name":"B","val":15}],
                      "links":[{"source":"1","target":"2"}]}"#;
        assert!(!parse_graph(raw).is_fallback());
    }

    #[test]
    fn test_first_json_object() {
        assert_eq!(first_json_object("a {b} {c}"), Some("{b}"));
        assert_eq!(first_json_object("{{}}x"), Some("{{}}"));
        assert_eq!(first_json_object("{ \"k\": \"\\\\\" }"), Some("{ \"k\": \"\\\\\" }"));
        assert_eq!(first_json_object("no braces"), None);
        assert_eq!(first_json_object("{ unbalanced"), None);
    }
}
