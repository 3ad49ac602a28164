// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config error reports for `courtwatch.toml`.
//!
//! Figment failures become miette diagnostics that name the section in
//! dotted form (`venues[1].scraper`), point at the offending line when the
//! value came from a TOML source, and suggest the closest known key or
//! scraper platform.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Source name used for configuration passed in as a string.
pub const INLINE_SOURCE: &str = "<inline>";

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error ready for rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(
        code(courtwatch::config::unknown_key),
        help("{}", did_you_mean(suggestion.as_deref(), "valid keys", valid_keys))
    )]
    UnknownKey {
        key: String,
        /// `[queue]`, `[[venues]] #2` and so on; `the top level` for the root.
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a courtwatch setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A string that should name an enum variant, e.g. `scraper.platform`.
    #[error("`{value}` is not a valid value for `{key}`")]
    #[diagnostic(
        code(courtwatch::config::unknown_value),
        help("{}", did_you_mean(suggestion.as_deref(), "expected one of", expected))
    )]
    UnknownValue {
        key: String,
        value: String,
        suggestion: Option<String>,
        expected: String,
        #[label("unknown value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(courtwatch::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}` in {section}")]
    #[diagnostic(
        code(courtwatch::config::missing_key),
        help("{}", missing_key_help(section, key))
    )]
    MissingKey { key: String, section: String },

    /// A semantic check on a deserialized value failed.
    #[error("validation error: {message}")]
    #[diagnostic(code(courtwatch::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(courtwatch::config::other))]
    Other(String),
}

fn did_you_mean(suggestion: Option<&str>, label: &str, options: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {label}: {options}"),
        None => format!("{label}: {options}"),
    }
}

fn missing_key_help(section: &str, key: &str) -> String {
    if section.starts_with("[[venues]]") {
        format!("every [[venues]] entry needs `{key}`, e.g. `{key} = \"...\"`")
    } else if section.starts_with("[[users]]") {
        format!("every [[users]] entry needs `{key}`, e.g. `{key} = \"...\"`")
    } else {
        format!("add `{key} = <value>` under {section} in courtwatch.toml")
    }
}

/// Convert every error carried by a `figment::Error` into a `ConfigError`.
///
/// `toml_sources` pairs a source name (a file path or [`INLINE_SOURCE`])
/// with its contents so spans can be attached.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = locate(&error, &error.path, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    section: section_label(&error.path),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::UnknownVariant(value, expected) => {
                let (span, src) = locate_leaf(&error, toml_sources);
                ConfigError::UnknownValue {
                    key: dotted_path(&error.path),
                    value: value.clone(),
                    suggestion: suggest_key(value, expected),
                    expected: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.clone().into_owned(),
                section: section_label(&error.path),
            },
            Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected) => {
                let (span, src) = locate_leaf(&error, toml_sources);
                ConfigError::InvalidType {
                    key: dotted_path(&error.path),
                    detail: format!("found {actual}"),
                    expected: expected.clone(),
                    span,
                    src,
                }
            }
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

/// `["venues", "1", "scraper"]` becomes `venues[1].scraper`.
pub fn dotted_path(path: &[String]) -> String {
    let mut out = String::new();
    for part in path {
        if part.parse::<usize>().is_ok() {
            out.push_str(&format!("[{part}]"));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(part);
        }
    }
    out
}

fn section_label(path: &[String]) -> String {
    match path {
        [] => "the top level".to_string(),
        [array, index] if index.parse::<usize>().is_ok() => {
            let nth = index.parse::<usize>().map_or(1, |i| i + 1);
            format!("[[{array}]] #{nth}")
        }
        _ => format!("[{}]", dotted_path(path)),
    }
}

/// Span for an error whose path ends in the offending key.
fn locate_leaf(
    error: &figment::error::Error,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    match error.path.split_last() {
        Some((field, section)) => locate(error, section, field, toml_sources),
        None => (None, None),
    }
}

fn locate(
    error: &figment::error::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((name, content)) = source_for(error, toml_sources) else {
        return (None, None);
    };
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.to_string())),
        ),
        None => (None, None),
    }
}

/// The TOML source an error came from. Environment overrides have none.
fn source_for<'a>(
    error: &figment::error::Error,
    toml_sources: &'a [(String, String)],
) -> Option<(&'a str, &'a str)> {
    let metadata = error.metadata.as_ref()?;
    let wanted = match &metadata.source {
        Some(figment::Source::File(path)) => path.display().to_string(),
        None if metadata.name.ends_with("source string") => INLINE_SOURCE.to_string(),
        _ => return None,
    };
    toml_sources
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(name, content)| (name.as_str(), content.as_str()))
}

/// Byte offset of `field` inside the table named by `path`.
///
/// Array indices pick the matching `[[venues]]`/`[[users]]` block, and a
/// sub-table such as `[venues.scraper]` is searched for after it. The scan
/// stops at the next table header.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = table_offset(content, path)?;
    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            break;
        }
        if let Some(after) = trimmed.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

fn table_offset(content: &str, path: &[String]) -> Option<usize> {
    let mut pos = 0;
    let mut named: Vec<&str> = Vec::new();
    let mut parts = path.iter().peekable();
    while let Some(part) = parts.next() {
        named.push(part);
        let table = named.join(".");
        match parts.peek().map(|next| next.parse::<usize>()) {
            Some(Ok(index)) => {
                parts.next();
                pos = header_end(content, pos, &format!("[[{table}]]"), index)?;
            }
            Some(Err(_)) => {}
            None => {
                pos = header_end(content, pos, &format!("[{table}]"), 0)
                    .or_else(|| header_end(content, pos, &format!("[[{table}]]"), 0))?;
            }
        }
    }
    Some(pos)
}

/// Offset just past the `nth` line equal to `header`, searching from `from`.
fn header_end(content: &str, from: usize, header: &str, nth: usize) -> Option<usize> {
    let mut offset = from;
    let mut seen = 0;
    for line in content[from..].split_inclusive('\n') {
        offset += line.len();
        if line.trim() == header {
            if seen == nth {
                return Some(offset);
            }
            seen += 1;
        }
    }
    None
}

/// Closest candidate to `unknown` by Jaro-Winkler similarity, if any is close enough.
pub fn suggest_key(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|&c| (strsim::jaro_winkler(unknown, c), c))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
