//! # JSON Documents
//!
//! Expanded JSON-LD without a context: an array of named graphs, each
//! `{"@id": graph, "@graph": [node, ...]}`. Nodes list `rdf:type` objects
//! under `@type` and every other predicate as an array of value objects.

use super::Dataset;
use crate::{Iri, Literal, ProvstoreError, Term, Triple, vocab};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Render `dataset` as a JSON document.
pub fn render(dataset: &Dataset) -> Result<Vec<u8>, ProvstoreError> {
    let mut graphs = Vec::new();
    for (graph, triples) in dataset.graphs() {
        let mut nodes: BTreeMap<&Iri, Map<String, Value>> = BTreeMap::new();
        for triple in triples {
            let node = nodes.entry(&triple.subject).or_insert_with(|| {
                let mut node = Map::new();
                node.insert("@id".to_string(), json!(triple.subject.as_str()));
                node
            });
            match (&triple.object, triple.predicate.as_str()) {
                (Term::Iri(class), vocab::RDF_TYPE) => {
                    push_value(node, "@type", json!(class.as_str()));
                }
                (object, predicate) => push_value(node, predicate, term_to_json(object)),
            }
        }
        graphs.push(json!({
            "@id": graph.as_str(),
            "@graph": nodes.into_values().map(Value::Object).collect::<Vec<_>>(),
        }));
    }
    serde_json::to_vec_pretty(&Value::Array(graphs))
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))
}

/// Parse a JSON document produced by [`render`].
pub fn parse(bytes: &[u8]) -> Result<Dataset, ProvstoreError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
    let graphs = value
        .as_array()
        .ok_or_else(|| malformed("top level must be an array"))?;

    let mut dataset = Dataset::new();
    for graph in graphs {
        let graph_iri = graph
            .get("@id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("graph without @id"))?;
        let graph_iri = Iri::new(graph_iri);
        let nodes = graph
            .get("@graph")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("graph without @graph array"))?;

        for node in nodes {
            let node = node.as_object().ok_or_else(|| malformed("node is not an object"))?;
            let subject = node
                .get("@id")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("node without @id"))?;
            for (key, values) in node {
                if key == "@id" {
                    continue;
                }
                for value in as_list(values) {
                    let (predicate, object) = if key == "@type" {
                        let class = value.as_str().ok_or_else(|| malformed("@type must be a string"))?;
                        (vocab::RDF_TYPE, Term::iri(class))
                    } else if key.starts_with('@') {
                        continue;
                    } else {
                        (key.as_str(), json_to_term(value)?)
                    };
                    dataset.insert(graph_iri.clone(), Triple::new(subject, predicate, object));
                }
            }
        }
    }
    Ok(dataset)
}

fn push_value(node: &mut Map<String, Value>, key: &str, value: Value) {
    match node.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            node.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn term_to_json(term: &Term) -> Value {
    match term {
        Term::Iri(iri) => json!({ "@id": iri.as_str() }),
        Term::Blank(label) => json!({ "@id": format!("_:{label}") }),
        Term::Literal(lit) => {
            let mut obj = Map::new();
            obj.insert("@value".to_string(), json!(lit.lexical));
            if let Some(lang) = &lit.language {
                obj.insert("@language".to_string(), json!(lang));
            } else if let Some(dt) = &lit.datatype {
                obj.insert("@type".to_string(), json!(dt.as_str()));
            }
            Value::Object(obj)
        }
    }
}

fn json_to_term(value: &Value) -> Result<Term, ProvstoreError> {
    if let Some(id) = value.get("@id").and_then(Value::as_str) {
        return Ok(match id.strip_prefix("_:") {
            Some(label) => Term::Blank(label.to_string()),
            None => Term::iri(id),
        });
    }
    let raw = value
        .get("@value")
        .ok_or_else(|| malformed("value object without @id or @value"))?;
    let lexical = match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let literal = if let Some(lang) = value.get("@language").and_then(Value::as_str) {
        Literal::tagged(lexical, lang)
    } else if let Some(dt) = value.get("@type").and_then(Value::as_str) {
        Literal::typed(lexical, dt)
    } else {
        Literal::simple(lexical)
    };
    Ok(Term::Literal(literal))
}

fn malformed(msg: &str) -> ProvstoreError {
    ProvstoreError::SerializationFailure(format!("malformed JSON document: {msg}"))
}
