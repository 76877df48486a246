//! # N-Quads
//!
//! Line-oriented rendering and parsing. Each statement is one line,
//! `<s> <p> <o> <g> .`; lines without a graph term take the caller's default
//! graph, which is how N-Triples input is read.

use super::Dataset;
use crate::{Iri, Literal, ProvstoreError, Term, Triple};

/// Render every quad of `dataset`, one per line.
#[must_use]
pub fn render(dataset: &Dataset) -> String {
    let mut out = String::new();
    for quad in dataset.quads() {
        out.push_str(&quad.to_string());
        out.push('\n');
    }
    out
}

/// Parse N-Quads text. Lines without a graph go to `default_graph`.
pub fn parse(text: &str, default_graph: Option<&Iri>) -> Result<Dataset, ProvstoreError> {
    let mut dataset = Dataset::new();
    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (triple, graph) = parse_line(trimmed).map_err(|msg| {
            ProvstoreError::SerializationFailure(format!("line {}: {msg}", lineno + 1))
        })?;
        let graph = match (graph, default_graph) {
            (Some(g), _) => g,
            (None, Some(g)) => g.clone(),
            (None, None) => {
                return Err(ProvstoreError::SerializationFailure(format!(
                    "line {}: statement has no graph",
                    lineno + 1
                )));
            }
        };
        dataset.insert(graph, triple);
    }
    Ok(dataset)
}

fn parse_line(line: &str) -> Result<(Triple, Option<Iri>), String> {
    let mut cursor = Cursor { rest: line };

    let subject = match cursor.term()? {
        Term::Iri(iri) => iri,
        _ => return Err("subject must be an IRI".to_string()),
    };
    let predicate = match cursor.term()? {
        Term::Iri(iri) => iri,
        _ => return Err("predicate must be an IRI".to_string()),
    };
    let object = cursor.term()?;

    cursor.skip_ws();
    let graph = if cursor.rest.starts_with('<') {
        match cursor.term()? {
            Term::Iri(iri) => Some(iri),
            _ => return Err("graph must be an IRI".to_string()),
        }
    } else {
        None
    };

    cursor.skip_ws();
    if cursor.rest != "." {
        return Err(format!("expected '.', found '{}'", cursor.rest));
    }

    Ok((
        Triple {
            subject,
            predicate,
            object,
        },
        graph,
    ))
}

struct Cursor<'a> {
    rest: &'a str,
}

impl Cursor<'_> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn term(&mut self) -> Result<Term, String> {
        self.skip_ws();
        if let Some(after) = self.rest.strip_prefix('<') {
            let end = after.find('>').ok_or("unterminated IRI")?;
            let iri = &after[..end];
            self.rest = &after[end + 1..];
            Ok(Term::iri(iri))
        } else if let Some(after) = self.rest.strip_prefix("_:") {
            let end = after
                .find(|c: char| c.is_whitespace())
                .unwrap_or(after.len());
            let label = &after[..end];
            self.rest = &after[end..];
            Ok(Term::Blank(label.to_string()))
        } else if self.rest.starts_with('"') {
            self.literal().map(Term::Literal)
        } else {
            Err(format!("unexpected input '{}'", self.rest))
        }
    }

    fn literal(&mut self) -> Result<Literal, String> {
        let mut lexical = String::new();
        let mut chars = self.rest.char_indices().skip(1);
        let mut close = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    close = Some(i);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => lexical.push('\n'),
                    Some((_, 'r')) => lexical.push('\r'),
                    Some((_, 't')) => lexical.push('\t'),
                    Some((_, '"')) => lexical.push('"'),
                    Some((_, '\\')) => lexical.push('\\'),
                    Some((_, other)) => return Err(format!("unknown escape '\\{other}'")),
                    None => return Err("dangling escape".to_string()),
                },
                other => lexical.push(other),
            }
        }
        let close = close.ok_or("unterminated literal")?;
        self.rest = &self.rest[close + 1..];

        if let Some(after) = self.rest.strip_prefix('@') {
            let end = after
                .find(|c: char| c.is_whitespace())
                .unwrap_or(after.len());
            let language = &after[..end];
            self.rest = &after[end..];
            Ok(Literal::tagged(lexical, language))
        } else if let Some(after) = self.rest.strip_prefix("^^") {
            self.rest = after;
            match self.term()? {
                Term::Iri(dt) => Ok(Literal {
                    lexical,
                    datatype: Some(dt),
                    language: None,
                }),
                _ => Err("datatype must be an IRI".to_string()),
            }
        } else {
            Ok(Literal::simple(lexical))
        }
    }
}
