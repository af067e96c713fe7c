//! `trace.dot` codec
//!
//! The trace is the textual form of the relationship graph, written in the
//! subset of graphviz the archive has always used:
//!
//! ```text
//! digraph G {
//! 0 [label="stack", shape="trapezium", args="Spacing=[1,1,1];"];
//! 1 [label="Reader", shape="invtriangle", args="Path=a.tif;"];
//! 1 -> 2 [label="Volume"];
//! }
//! ```
//!
//! Vertices and edges keep the order they were added in; that order is part
//! of the round trip.

use crate::error::CodecError;
use indexmap::IndexMap;
use seg_core::{Arguments, ItemId, ItemKind};
use seg_graph::{GraphError, Relation, RelationshipGraph};
use seg_model::AnalysisModel;
use std::fmt;
use std::str::FromStr;

const LABEL: &str = "label";
const SHAPE: &str = "shape";
const ARGS: &str = "args";

/// One parsed vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceVertex {
    /// Archive-local id
    pub id: ItemId,
    /// Item kind, from the vertex shape
    pub kind: ItemKind,
    /// Display name
    pub name: String,
    /// Serialized arguments
    pub arguments: Arguments,
}

impl TraceVertex {
    /// Vertex description
    #[must_use]
    pub fn new(id: ItemId, kind: ItemKind, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            arguments,
        }
    }
}

/// Vertices and edges of a serialized relationship graph
#[derive(Debug, Clone, Default)]
pub struct Trace {
    vertices: IndexMap<ItemId, TraceVertex>,
    graph: RelationshipGraph,
}

impl Trace {
    /// Empty trace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the model's registry and relations
    ///
    /// # Errors
    ///
    /// An item whose arguments cannot be serialized.
    pub fn from_model(model: &AnalysisModel) -> Result<Self, CodecError> {
        let mut trace = Self::new();
        for item in model.items() {
            let arguments = item
                .arguments()
                .map_err(|source| CodecError::ItemArguments { id: item.id(), source })?;
            trace
                .add_vertex(TraceVertex::new(item.id(), item.kind(), item.name(), arguments))
                .map_err(|source| CodecError::Graph { line: 0, source })?;
        }
        for relation in model.relations() {
            trace
                .add_edge(relation.source, relation.target, relation.label)
                .map_err(|source| CodecError::Graph { line: 0, source })?;
        }
        Ok(trace)
    }

    /// Append a vertex
    ///
    /// # Errors
    ///
    /// Duplicate id or a kind that is not part of the relation graph.
    pub fn add_vertex(&mut self, vertex: TraceVertex) -> Result<(), GraphError> {
        self.graph.add_item(vertex.id, vertex.kind)?;
        self.vertices.insert(vertex.id, vertex);
        Ok(())
    }

    /// Append an edge
    ///
    /// # Errors
    ///
    /// Unknown endpoint, duplicate, or a dependency cycle.
    pub fn add_edge(&mut self, source: ItemId, target: ItemId, label: impl Into<String>) -> Result<Relation, GraphError> {
        self.graph.add_relation(source, target, label)
    }

    /// Vertex by id
    #[inline]
    #[must_use]
    pub fn vertex(&self, id: ItemId) -> Option<&TraceVertex> {
        self.vertices.get(&id)
    }

    /// Vertices in file order
    pub fn vertices(&self) -> impl Iterator<Item = &TraceVertex> + '_ {
        self.vertices.values()
    }

    /// Number of vertices
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Edges in file order
    #[must_use]
    pub fn edges(&self) -> Vec<Relation> {
        self.graph.relations()
    }

    /// Number of edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.relation_count()
    }

    /// Graph view of the trace
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// Drop every edge touching `id`, returning them
    pub(crate) fn drop_edges(&mut self, id: ItemId) -> Vec<Relation> {
        self.graph.remove_relations_of(id).unwrap_or_default()
    }

    /// Parse `trace.dot`
    ///
    /// # Errors
    ///
    /// Malformed lines, unknown shapes, arguments that break the grammar,
    /// duplicate vertices, edges to unknown vertices, dependency cycles.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let mut trace = Self::new();
        for (index, line) in raw.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty()
                || line.starts_with("//")
                || line.starts_with('#')
                || line.starts_with("digraph")
                || line.starts_with('}')
            {
                continue;
            }
            trace.parse_line(line_no, line)?;
        }
        Ok(trace)
    }

    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<(), CodecError> {
        let syntax = |message: &str| CodecError::Syntax {
            line: line_no,
            message: message.to_string(),
        };
        let (head, rest) = line.split_once('[').ok_or_else(|| syntax("missing attribute list"))?;
        let body = rest
            .trim_end()
            .trim_end_matches(';')
            .trim_end()
            .strip_suffix(']')
            .ok_or_else(|| syntax("unterminated attribute list"))?;
        let mut attributes = parse_attributes(body).map_err(|message| syntax(&message))?;
        let parse_id = |raw: &str| -> Result<ItemId, CodecError> {
            raw.trim()
                .parse()
                .map_err(|_| syntax(&format!("invalid vertex id `{}`", raw.trim())))
        };

        if let Some((source, target)) = head.split_once("->") {
            let source = parse_id(source)?;
            let target = parse_id(target)?;
            let label = attributes.shift_remove(LABEL).ok_or_else(|| syntax("edge without label"))?;
            self.add_edge(source, target, label)
                .map_err(|source| CodecError::Graph { line: line_no, source })?;
            return Ok(());
        }

        let id = parse_id(head)?;
        let shape = attributes.shift_remove(SHAPE).ok_or_else(|| syntax("vertex without shape"))?;
        let kind = ItemKind::from_shape(&shape).ok_or(CodecError::UnknownShape { line: line_no, shape })?;
        let name = attributes.shift_remove(LABEL).unwrap_or_default();
        let arguments = Arguments::parse(attributes.get(ARGS).map_or("", String::as_str))
            .map_err(|source| CodecError::Arguments { line: line_no, source })?;
        self.add_vertex(TraceVertex::new(id, kind, name, arguments))
            .map_err(|source| CodecError::Graph { line: line_no, source })
    }

    /// Text of `trace.dot`
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph G {{")?;
        for vertex in self.vertices.values() {
            // Only graph kinds ever become vertices.
            let shape = vertex.kind.shape().unwrap_or_default();
            writeln!(
                f,
                "{} [{LABEL}=\"{}\", {SHAPE}=\"{shape}\", {ARGS}=\"{}\"];",
                vertex.id,
                escape(&vertex.name),
                escape(&vertex.arguments.to_string()),
            )?;
        }
        for relation in self.graph.relations() {
            writeln!(
                f,
                "{} -> {} [{LABEL}=\"{}\"];",
                relation.source,
                relation.target,
                escape(&relation.label)
            )?;
        }
        writeln!(f, "}}")
    }
}

impl FromStr for Trace {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// `key="value", key=value` pairs; commas and whitespace both separate
fn parse_attributes(raw: &str) -> Result<IndexMap<String, String>, String> {
    let mut attributes = IndexMap::new();
    let mut chars = raw.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',' || *c == ';').is_some() {}
        if chars.peek().is_none() {
            return Ok(attributes);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if key.is_empty() || chars.next() != Some('=') {
            return Err(format!("malformed attribute near `{key}`"));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some(c) => value.push(c),
                        None => return Err(format!("unterminated value of `{key}`")),
                    },
                    Some(c) => value.push(c),
                    None => return Err(format!("unterminated value of `{key}`")),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != ',') {
                value.push(c);
            }
        }
        attributes.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_TRACE: &str = r#"digraph G {
0 [label="stack", shape="trapezium", args="Spacing=[1,1,1];"];
1 [label="Reader", shape="invtriangle", args="Path=a.tif;"];
2 [label="stack.tif", shape="box", args="Hue=0.3;Volume=1_0;"];
3 [label="Threshold", shape="invtriangle", args="Level=30;Inputs=1_0;"];
4 [label="Segmentation 1", shape="ellipse", args="Output=0;Number=1;"];
0 -> 2 [label="Stain"];
1 -> 2 [label="Volume"];
1 -> 3 [label="0-0"];
3 -> 4 [label="CreateLink"];
}
"#;

    #[test]
    fn parses_vertices_and_edges_in_order() {
        let trace = Trace::parse(SAMPLE_TRACE).unwrap();
        let kinds: Vec<ItemKind> = trace.vertices().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ItemKind::Sample,
                ItemKind::Filter,
                ItemKind::Channel,
                ItemKind::Filter,
                ItemKind::Segmentation
            ]
        );
        let channel = trace.vertex(ItemId::new(2)).unwrap();
        assert_eq!(channel.name, "stack.tif");
        assert_eq!(channel.arguments.get("Volume"), Some("1_0"));
        assert_eq!(
            trace.edges().iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            vec!["Stain", "Volume", "0-0", "CreateLink"]
        );
    }

    #[test]
    fn render_is_stable() {
        let trace = Trace::parse(SAMPLE_TRACE).unwrap();
        assert_eq!(trace.render(), SAMPLE_TRACE);
    }

    #[test]
    fn quotes_and_backslashes_survive() {
        let mut trace = Trace::new();
        trace
            .add_vertex(TraceVertex::new(
                ItemId::new(0),
                ItemKind::Sample,
                "a \"quoted\" \\ name",
                Arguments::new(),
            ))
            .unwrap();
        let parsed = Trace::parse(&trace.render()).unwrap();
        assert_eq!(parsed.vertex(ItemId::new(0)).unwrap().name, "a \"quoted\" \\ name");
    }

    #[test]
    fn boost_style_attribute_lists_are_accepted() {
        let trace = Trace::parse("digraph G {\n0[args=\"\" label=\"s\" shape=trapezium];\n}\n").unwrap();
        assert_eq!(trace.vertex(ItemId::new(0)).unwrap().kind, ItemKind::Sample);
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let err = Trace::parse("digraph G {\n0 [label=\"s\", shape=\"hexagon\"];\n}\n").unwrap_err();
        assert!(matches!(err, CodecError::UnknownShape { line: 2, .. }));

        let err = Trace::parse("0 [label=\"s\", shape=\"box\", args=\"Volume\"];").unwrap_err();
        assert!(matches!(err, CodecError::Arguments { line: 1, .. }));

        let err = Trace::parse("0 -> 1 [label=\"Stain\"];").unwrap_err();
        assert!(matches!(err, CodecError::Graph { line: 1, .. }));

        let err = Trace::parse("0 label=\"s\"").unwrap_err();
        assert!(matches!(err, CodecError::Syntax { line: 1, .. }));
    }

    #[test]
    fn second_creator_is_rejected_on_its_line() {
        let raw = SAMPLE_TRACE.replace(
            "3 -> 4 [label=\"CreateLink\"];\n",
            "3 -> 4 [label=\"CreateLink\"];\n1 -> 4 [label=\"CreateLink\"];\n",
        );
        let err = Trace::parse(&raw).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Graph {
                line: 11,
                source: GraphError::SecondAncestor { .. },
            }
        ));
    }
}
