//! Resolve router and interface name patterns against a [`Graph`].
//!
//! Patterns are regular expressions that must match the whole name.

use regex::Regex;

use crate::graph::{Graph, GraphEdge};

/// Compile `pattern` so that it only matches complete names.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Edges whose router matches `node` and whose starting interface matches `iface`.
pub fn find_matching_edges(graph: &Graph, node: &Regex, iface: &Regex) -> Vec<GraphEdge> {
    graph
        .edge_map()
        .iter()
        .filter(|(router, _)| node.is_match(router))
        .flat_map(|(_, edges)| edges.iter())
        .filter(|edge| iface.is_match(&edge.start))
        .cloned()
        .collect()
}

/// Routers whose name matches `node`, in sorted order.
pub fn find_matching_nodes(graph: &Graph, node: &Regex) -> Vec<String> {
    graph
        .configurations()
        .keys()
        .filter(|router| node.is_match(router))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Interface};

    fn graph() -> Graph {
        let mut configs = Vec::new();
        for (name, ip) in [("core1", "10.0.0.1/24"), ("core2", "10.0.0.2/24"), ("edge", "10.1.0.1/24")] {
            let mut conf = Configuration::new(name);
            conf.add_interface(Interface::new("eth0", Some(ip.parse().expect("address"))));
            configs.push(conf);
        }
        Graph::new(configs)
    }

    #[test]
    fn patterns_are_anchored() {
        let g = graph();
        let core = compile_pattern("core").expect("pattern");
        assert!(find_matching_nodes(&g, &core).is_empty());
        let core = compile_pattern("core.*").expect("pattern");
        assert_eq!(find_matching_nodes(&g, &core), vec!["core1", "core2"]);
        let any = compile_pattern(".*").expect("pattern");
        assert_eq!(find_matching_nodes(&g, &any).len(), 3);
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let g = graph();
        let p = compile_pattern("core1|edge").expect("pattern");
        assert_eq!(find_matching_nodes(&g, &p), vec!["core1", "edge"]);
    }

    #[test]
    fn edges_filter_on_router_and_interface() {
        let g = graph();
        let edges = find_matching_edges(
            &g,
            &compile_pattern("edge").expect("pattern"),
            &compile_pattern("eth.*").expect("pattern"),
        );
        assert_eq!(edges.len(), 1);
        assert!(edges[0].is_environment());
        let none = find_matching_edges(
            &g,
            &compile_pattern("edge").expect("pattern"),
            &compile_pattern("lo").expect("pattern"),
        );
        assert!(none.is_empty());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(compile_pattern("(").is_err());
    }
}
