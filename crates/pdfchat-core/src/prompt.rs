//! Prompt assembly from configurable templates.
//!
//! Two render modes exist, one per conversation state:
//!
//! - **Initial question** ([`InitialQuestion`]) grounds the opening question
//!   of a session in the retrieved documents.
//! - **Continuation** ([`Continuation`]) wraps a follow-up question; the
//!   grounding is already present in the message history.
//!
//! Rendering sits behind the [`PromptRenderer`] trait so the template
//! language can be swapped without touching the conversation pipeline.
//! [`TemplateRenderer`] is the built-in implementation.
//!
//! # Template language
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `{{question}}`, `{{language}}` | Substituted in both modes |
//! | `{{#documents}} … {{/documents}}` | Repeated once per grounding document (initial mode only) |
//! | `{{url}}`, `{{offset}}`, `{{content}}`, `{{number}}` | Per-document fields, valid inside the section; `number` is 1-based |
//!
//! Templates are parsed and checked against their mode when the renderer is
//! built, so a malformed configuration fails at startup rather than on the
//! first chat turn.

use thiserror::Error;

use crate::models::GroundingDocument;

pub const DEFAULT_INIT_QUESTION_TEMPLATE: &str = "\
You are an assistant answering questions about technical product documentation.
Answer in {{language}}. Use only the documents below; if they do not contain the answer, say so.

{{#documents}}Document {{number}} ({{url}}, offset {{offset}}):
{{content}}

{{/documents}}Question: {{question}}";

pub const DEFAULT_CONTINUATION_TEMPLATE: &str = "\
Using the documents and answers earlier in this conversation, answer the follow-up question in {{language}}.

Question: {{question}}";

const DOCUMENTS_SECTION: &str = "documents";
const TOP_LEVEL_FIELDS: &[&str] = &["question", "language"];
const DOCUMENT_FIELDS: &[&str] = &["url", "offset", "content", "number"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag starting at byte {0}")]
    Unterminated(usize),

    #[error("empty tag at byte {0}")]
    EmptyTag(usize),

    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("sections cannot be nested")]
    NestedSection,

    #[error("closing tag '{0}' has no matching opening tag")]
    UnbalancedSection(String),

    #[error("section '{0}' is never closed")]
    UnclosedSection(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("section '{0}' is not available in this template")]
    SectionNotAllowed(String),
}

/// Data for the opening, grounded question of a session.
#[derive(Debug, Clone, Copy)]
pub struct InitialQuestion<'a> {
    pub language: &'a str,
    pub question: &'a str,
    pub documents: &'a [GroundingDocument],
}

/// Data for a follow-up question.
#[derive(Debug, Clone, Copy)]
pub struct Continuation<'a> {
    pub question: &'a str,
    pub language: &'a str,
}

/// Pure prompt rendering, one method per mode.
pub trait PromptRenderer: Send + Sync {
    fn render_initial(&self, data: &InitialQuestion<'_>) -> Result<String, TemplateError>;
    fn render_continuation(&self, data: &Continuation<'_>) -> Result<String, TemplateError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field(String),
    Documents(Vec<Segment>),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut top: Vec<Segment> = Vec::new();
        let mut section: Option<(String, Vec<Segment>)> = None;
        let mut rest = source;
        let mut pos = 0usize;

        while let Some(open) = rest.find("{{") {
            let text = &rest[..open];
            let tag_start = pos + open;
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(tag_start))?;
            let tag = after_open[..close].trim();

            let target = match section.as_mut() {
                Some((_, body)) => body,
                None => &mut top,
            };
            if !text.is_empty() {
                target.push(Segment::Text(text.to_string()));
            }

            if tag.is_empty() {
                return Err(TemplateError::EmptyTag(tag_start));
            } else if let Some(name) = tag.strip_prefix('#') {
                let name = name.trim();
                if section.is_some() {
                    return Err(TemplateError::NestedSection);
                }
                if name != DOCUMENTS_SECTION {
                    return Err(TemplateError::UnknownSection(name.to_string()));
                }
                section = Some((name.to_string(), Vec::new()));
            } else if let Some(name) = tag.strip_prefix('/') {
                let name = name.trim();
                match section.take() {
                    Some((open_name, body)) if open_name == name => {
                        top.push(Segment::Documents(body));
                    }
                    _ => return Err(TemplateError::UnbalancedSection(name.to_string())),
                }
            } else {
                target.push(Segment::Field(tag.to_string()));
            }

            let consumed = open + 2 + close + 2;
            rest = &rest[consumed..];
            pos += consumed;
        }

        if let Some((name, _)) = section {
            return Err(TemplateError::UnclosedSection(name));
        }
        if !rest.is_empty() {
            top.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments: top })
    }

    /// Reject fields and sections the given mode cannot supply.
    fn check(&self, allow_documents: bool) -> Result<(), TemplateError> {
        for segment in &self.segments {
            match segment {
                Segment::Text(_) => {}
                Segment::Field(name) => check_field(name, TOP_LEVEL_FIELDS)?,
                Segment::Documents(body) => {
                    if !allow_documents {
                        return Err(TemplateError::SectionNotAllowed(
                            DOCUMENTS_SECTION.to_string(),
                        ));
                    }
                    for inner in body {
                        if let Segment::Field(name) = inner {
                            check_field(name, DOCUMENT_FIELDS)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_field(name: &str, allowed: &[&str]) -> Result<(), TemplateError> {
    if allowed.contains(&name) {
        Ok(())
    } else {
        Err(TemplateError::UnknownField(name.to_string()))
    }
}

fn top_level_value<'a>(
    name: &str,
    question: &'a str,
    language: &'a str,
) -> Result<&'a str, TemplateError> {
    match name {
        "question" => Ok(question),
        "language" => Ok(language),
        other => Err(TemplateError::UnknownField(other.to_string())),
    }
}

fn document_value(
    name: &str,
    index: usize,
    doc: &GroundingDocument,
) -> Result<String, TemplateError> {
    match name {
        "url" => Ok(doc.url.clone()),
        "offset" => Ok(doc.offset.to_string()),
        "content" => Ok(doc.content.clone()),
        "number" => Ok((index + 1).to_string()),
        other => Err(TemplateError::UnknownField(other.to_string())),
    }
}

/// Built-in [`PromptRenderer`] over `{{placeholder}}` templates.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    initial: Template,
    continuation: Template,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_INIT_QUESTION_TEMPLATE, DEFAULT_CONTINUATION_TEMPLATE)
            .expect("built-in templates are valid")
    }
}

impl TemplateRenderer {
    /// Parse and check both templates.
    pub fn new(initial: &str, continuation: &str) -> Result<Self, TemplateError> {
        let initial = Template::parse(initial)?;
        initial.check(true)?;
        let continuation = Template::parse(continuation)?;
        continuation.check(false)?;
        Ok(Self {
            initial,
            continuation,
        })
    }
}

impl PromptRenderer for TemplateRenderer {
    fn render_initial(&self, data: &InitialQuestion<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.initial.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    out.push_str(top_level_value(name, data.question, data.language)?)
                }
                Segment::Documents(body) => {
                    for (index, doc) in data.documents.iter().enumerate() {
                        for inner in body {
                            match inner {
                                Segment::Text(text) => out.push_str(text),
                                Segment::Field(name) => {
                                    out.push_str(&document_value(name, index, doc)?)
                                }
                                Segment::Documents(_) => return Err(TemplateError::NestedSection),
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn render_continuation(&self, data: &Continuation<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.continuation.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    out.push_str(top_level_value(name, data.question, data.language)?)
                }
                Segment::Documents(_) => {
                    return Err(TemplateError::SectionNotAllowed(
                        DOCUMENTS_SECTION.to_string(),
                    ))
                }
            }
        }
        Ok(out)
    }
}
