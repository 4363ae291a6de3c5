//! The command descriptor: a normalized view of one inbound request.
//!
//! A [`Command`] is built once from the request's query parameters and never
//! mutated. Client-only parameters (record filter, target-selection query,
//! window id) are pulled out into dedicated fields and stripped from the
//! query string that is actually forwarded to the broker.

use crate::verb::Verb;

/// Parameter names that are consumed by this client and must not reach the
/// broker.
const RESERVED_PARAMS: [&str; 3] = ["recordfilter", "recordquery", "windowid"];

/// Prefix (case-sensitive) marking target-selection parameters.
const TORUS_PREFIX: &str = "torus";

/// A parsed, immutable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    raw_query: String,
    cleaned_query: String,
    record_filter: Option<String>,
    record_filter_target_criteria: Option<String>,
    target_selection_query: Option<String>,
    record_query: Option<String>,
}

impl Command {
    /// Build a command from a raw (still-encoded) query string.
    pub fn from_query(raw: &str) -> Self {
        let params: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self::from_params(&params, raw)
    }

    /// Build a command from pre-decoded parameters plus the original encoded
    /// query string. Malformed values never fail; absent or unparseable
    /// fields simply stay empty.
    pub fn from_params(params: &[(String, String)], raw: &str) -> Self {
        let verb_raw = first_param(params, "command").unwrap_or_default();
        let verb = Verb::parse(&verb_raw);

        let (record_filter, record_filter_target_criteria) =
            match first_param(params, "recordfilter") {
                Some(value) if !value.is_empty() => {
                    let (body, criteria) = split_record_filter(&value);
                    (Some(body), criteria)
                }
                _ => (None, None),
            };

        let torus_pairs: Vec<String> = params
            .iter()
            .filter(|(name, _)| name.starts_with(TORUS_PREFIX))
            .map(|(name, value)| {
                let stripped = &name[TORUS_PREFIX.len()..];
                format!("{stripped}={}", urlencoding::encode(value))
            })
            .collect();
        let target_selection_query = if torus_pairs.is_empty() {
            None
        } else {
            Some(torus_pairs.join("&"))
        };

        let record_query = if verb.is_record() {
            first_param(params, "recordquery").map(|q| {
                format!("command=search&query={}", urlencoding::encode(&q))
            })
        } else {
            None
        };

        Command {
            verb,
            raw_query: raw.to_string(),
            cleaned_query: clean_query(raw),
            record_filter,
            record_filter_target_criteria,
            target_selection_query,
            record_query,
        }
    }

    pub fn verb(&self) -> &Verb {
        &self.verb
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// The query string forwarded to the broker: the raw query with every
    /// client-only parameter removed, remainder untouched.
    pub fn cleaned_query(&self) -> &str {
        &self.cleaned_query
    }

    pub fn record_filter(&self) -> Option<&str> {
        self.record_filter.as_deref()
    }

    pub fn record_filter_target_criteria(&self) -> Option<&str> {
        self.record_filter_target_criteria.as_deref()
    }

    pub fn target_selection_query(&self) -> Option<&str> {
        self.target_selection_query.as_deref()
    }

    /// For `record` commands that carry a `recordquery`: the ready-made
    /// search query string used by record bootstrap.
    pub fn record_query(&self) -> Option<&str> {
        self.record_query.as_deref()
    }
}

fn first_param(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
        .filter(|v| v != "null")
}

/// Split `body[criteria]` into its parts. The criteria is the content of the
/// trailing bracket pair; a value without one is all body.
fn split_record_filter(value: &str) -> (String, Option<String>) {
    if let Some(stripped) = value.strip_suffix(']') {
        if let Some(open) = stripped.rfind('[') {
            let body = &stripped[..open];
            let criteria = &stripped[open + 1..];
            return (body.to_string(), Some(criteria.to_string()));
        }
    }
    (value.to_string(), None)
}

/// Remove every reserved `name=value` pair from the raw query string,
/// preserving the order and encoding of everything else.
fn clean_query(raw: &str) -> String {
    raw.split('&')
        .filter(|segment| {
            let name = segment.split('=').next().unwrap_or(segment);
            !RESERVED_PARAMS.contains(&name) && !name.starts_with(TORUS_PREFIX)
        })
        .collect::<Vec<_>>()
        .join("&")
}
