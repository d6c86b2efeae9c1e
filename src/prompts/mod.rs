//! Parameterized instruction templates.
//!
//! Every template is produced by a zero-argument function in [`templates`]
//! and declares the named slots it needs. Placeholders are written `{slot}`;
//! `{{` and `}}` render literal braces.

pub mod templates;

use std::collections::HashMap;
use thiserror::Error;

pub use templates::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("template '{template}' is missing required slot '{slot}'")]
    MissingSlot {
        template: &'static str,
        slot: String,
    },
    #[error("template '{template}' has an unterminated placeholder")]
    Malformed { template: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    name: &'static str,
    template: &'static str,
    input_variables: &'static [&'static str],
}

enum Segment<'a> {
    Text(&'a str),
    Slot(&'a str),
}

impl PromptTemplate {
    pub const fn new(
        name: &'static str,
        template: &'static str,
        input_variables: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            template,
            input_variables,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn input_variables(&self) -> &'static [&'static str] {
        self.input_variables
    }

    /// Placeholder names as they appear in the template text, in order.
    pub fn placeholders(&self) -> Result<Vec<&'static str>, PromptError> {
        Ok(self
            .segments()?
            .into_iter()
            .filter_map(|s| match s {
                Segment::Slot(name) => Some(name),
                Segment::Text(_) => None,
            })
            .collect())
    }

    /// Renders the template. Every declared slot must be present in `values`;
    /// extra keys are ignored.
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        let values: HashMap<&str, &str> = values.iter().copied().collect();

        if let Some(missing) = self
            .input_variables
            .iter()
            .find(|slot| !values.contains_key(**slot))
        {
            return Err(PromptError::MissingSlot {
                template: self.name,
                slot: missing.to_string(),
            });
        }

        let mut rendered = String::with_capacity(self.template.len());
        for segment in self.segments()? {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Slot(name) => {
                    let value = values.get(name).ok_or_else(|| PromptError::MissingSlot {
                        template: self.name,
                        slot: name.to_string(),
                    })?;
                    rendered.push_str(value);
                }
            }
        }

        Ok(rendered.trim().to_string())
    }

    fn segments(&self) -> Result<Vec<Segment<'static>>, PromptError> {
        let source: &'static str = self.template;
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(pos) = rest.find(['{', '}']) {
            let (text, tail) = rest.split_at(pos);
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }

            if let Some(after) = tail.strip_prefix("{{") {
                segments.push(Segment::Text("{"));
                rest = after;
            } else if let Some(after) = tail.strip_prefix("}}") {
                segments.push(Segment::Text("}"));
                rest = after;
            } else if let Some(after) = tail.strip_prefix('{') {
                let end = after.find('}').ok_or(PromptError::Malformed {
                    template: self.name,
                })?;
                segments.push(Segment::Slot(after[..end].trim()));
                rest = &after[end + 1..];
            } else {
                // A lone closing brace is kept verbatim.
                segments.push(Segment::Text("}"));
                rest = &tail[1..];
            }
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }

        Ok(segments)
    }
}
