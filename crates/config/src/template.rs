//! Parameterized benchmark query templates.
//!
//! A template is plain query text with two placeholders, `{start_block}` and `{end_block}`,
//! which are substituted with the bounds of the probed block range. Nothing else in the text is
//! interpreted, so templates delivered by a remote configuration can only ever change the query
//! text, never what the coordinator executes.

use std::fmt;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tally_primitives::BlockRange;

pub const START_BLOCK_PLACEHOLDER: &str = "{start_block}";
pub const END_BLOCK_PLACEHOLDER: &str = "{end_block}";

const DEFAULT_TEMPLATE: &str = "UNWIND range({start_block}, {end_block}) AS block_height MATCH \
                                (p:Transaction) WHERE p.block_height = block_height RETURN \
                                SUM(p.block_height);";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("template is missing the '{0}' placeholder")]
    MissingPlaceholder(&'static str),

    #[error("template contains the restricted keyword '{0}'")]
    RestrictedKeyword(String),

    #[error("invalid restricted keyword list: {0}")]
    InvalidKeywords(String),
}

/// A benchmark query template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryTemplate {
    text: String,
}

impl QueryTemplate {
    pub fn parse(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(TemplateError::Empty);
        }

        for placeholder in [START_BLOCK_PLACEHOLDER, END_BLOCK_PLACEHOLDER] {
            if !trimmed.contains(placeholder) {
                return Err(TemplateError::MissingPlaceholder(placeholder));
            }
        }

        Ok(Self { text: trimmed.to_string() })
    }

    /// Produces the concrete query text for the given block range.
    pub fn render(&self, range: &BlockRange) -> String {
        self.text
            .replace(START_BLOCK_PLACEHOLDER, &range.start.to_string())
            .replace(END_BLOCK_PLACEHOLDER, &range.end.to_string())
    }

    /// Fails if any of the `keywords` appears in the template as a whole word, ignoring case.
    pub fn ensure_read_only<S: AsRef<str>>(&self, keywords: &[S]) -> Result<(), TemplateError> {
        let alternatives = keywords
            .iter()
            .map(|k| k.as_ref().split_whitespace().map(regex::escape).collect::<Vec<_>>())
            .filter(|words| !words.is_empty())
            .map(|words| words.join(r"\s+"))
            .collect::<Vec<_>>();

        if alternatives.is_empty() {
            return Ok(());
        }

        let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| TemplateError::InvalidKeywords(e.to_string()))?;

        match regex.find(&self.text) {
            Some(found) => Err(TemplateError::RestrictedKeyword(found.as_str().to_uppercase())),
            None => Ok(()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self { text: DEFAULT_TEMPLATE.to_string() }
    }
}

impl TryFrom<String> for QueryTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<QueryTemplate> for String {
    fn from(value: QueryTemplate) -> Self {
        value.text
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
