//! `r2r://` resource URIs and URI template matching.
//!
//! Templates use simple `{name}` expansion in the path and an optional trailing RFC 6570 form-style
//! query expansion (`{?limit,offset}`). Matching is non-greedy: a variable extends up to the next
//! literal and never spans a `/`.

use std::collections::HashMap;

/// Prefix of every resource generated from the `OpenAPI` document.
pub const API_URI_BASE: &str = "r2r://api";

/// URI of a generated resource (or resource template) for an API path.
#[must_use]
pub fn api_uri(path: &str) -> String {
    if path.starts_with('/') {
        format!("{API_URI_BASE}{path}")
    } else {
        format!("{API_URI_BASE}/{path}")
    }
}

/// Split `uri` into the part before `?` and its decoded query pairs.
#[must_use]
pub fn split_query(uri: &str) -> (&str, Vec<(String, String)>) {
    match uri.split_once('?') {
        Some((base, query)) => (
            base,
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        ),
        None => (uri, Vec::new()),
    }
}

/// Names listed in a trailing `{?a,b}` query expansion.
#[must_use]
pub fn query_variables(template: &str) -> Vec<String> {
    let Some(start) = template.find("{?") else {
        return Vec::new();
    };
    template[start + 2..]
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Var(&'a str),
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let path = template
        .find("{?")
        .map_or(template, |idx| &template[..idx]);

    let mut tokens = Vec::new();
    let mut rest = path;
    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => match rest.find('}') {
                Some(end) => {
                    tokens.push(Token::Var(&rest[1..end]));
                    rest = &rest[end + 1..];
                }
                None => {
                    tokens.push(Token::Literal(rest));
                    rest = "";
                }
            },
            Some(idx) => {
                tokens.push(Token::Literal(&rest[..idx]));
                rest = &rest[idx..];
            }
            None => {
                tokens.push(Token::Literal(rest));
                rest = "";
            }
        }
    }
    tokens
}

/// Match a concrete URI (query string allowed) against `template`.
///
/// Returns the decoded path variables, plus any query pairs whose names the template declares in
/// a `{?...}` expansion. `None` when the URI does not fit the template.
#[must_use]
pub fn match_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let (path, query) = split_query(uri);
    let tokens = tokenize(template);

    let mut captured = HashMap::new();
    let mut rest = path;
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        match token {
            Token::Literal(lit) => {
                rest = rest.strip_prefix(*lit)?;
            }
            Token::Var(name) => {
                let end = match iter.peek() {
                    Some(Token::Literal(next)) => rest.find(*next)?,
                    _ => rest.len(),
                };
                let raw = &rest[..end];
                if raw.is_empty() || raw.contains('/') {
                    return None;
                }
                let value = urlencoding::decode(raw)
                    .map_or_else(|_| raw.to_string(), |v| v.into_owned());
                captured.insert((*name).to_string(), value);
                rest = &rest[end..];
            }
        }
    }

    if !rest.is_empty() {
        return None;
    }

    let declared = query_variables(template);
    for (k, v) in query {
        if declared.contains(&k) {
            captured.insert(k, v);
        }
    }

    Some(captured)
}
