//! Declarative per-line patch rules.
//!
//! A [`PatchRule`] pairs a line matcher with a [`Template`] that renders the
//! replacement text from a [`Version`]. Rules know nothing about files; the
//! patching loop lives in [`crate::patcher`].

use crate::version::Version;
use regex_lite::{NoExpand, Regex};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{{{name}}}}}' (expected one of: {})", Field::NAMES.join(", "))]
    UnknownField { name: String },

    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{id}': invalid pattern: {source}")]
    Pattern {
        id: String,
        source: regex_lite::Error,
    },

    #[error("rule '{id}': {source}")]
    Template { id: String, source: TemplateError },
}

/// A version field a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Canonical `major.minor.patch.build[-suffix]`
    Version,
    Major,
    Minor,
    Patch,
    Build,
    /// `-suffix`, or empty
    Suffix,
}

impl Field {
    pub const NAMES: [&'static str; 6] = ["version", "major", "minor", "patch", "build", "suffix"];

    fn from_name(name: &str) -> Option<Field> {
        Some(match name {
            "version" => Field::Version,
            "major" => Field::Major,
            "minor" => Field::Minor,
            "patch" => Field::Patch,
            "build" => Field::Build,
            "suffix" => Field::Suffix,
            _ => return None,
        })
    }

    fn render(self, version: &Version, out: &mut String) {
        use std::fmt::Write;
        // Writing into a String cannot fail.
        let _ = match self {
            Field::Version => write!(out, "{version}"),
            Field::Major => write!(out, "{}", version.major),
            Field::Minor => write!(out, "{}", version.minor),
            Field::Patch => write!(out, "{}", version.patch),
            Field::Build => write!(out, "{}", version.build),
            Field::Suffix => match &version.suffix {
                Some(tag) => write!(out, "-{tag}"),
                None => Ok(()),
            },
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Replacement text with `{{field}}` placeholders.
///
/// Anything that is not a `{{...}}` placeholder is copied verbatim, including
/// `$` and single braces, so NSIS-style `${LANG_ENGLISH}` survives untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated {
                    offset: offset + start,
                })?;
            let name = after_open[..end].trim();
            let field = Field::from_name(name).ok_or_else(|| TemplateError::UnknownField {
                name: name.to_string(),
            })?;
            segments.push(Segment::Field(field));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Template {
            source: source.to_string(),
            segments,
        })
    }

    pub fn render(&self, version: &Version) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => field.render(version, &mut out),
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One find-and-replace rule applied to every line of a target file.
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub id: String,
    matcher: Regex,
    render: Template,
    /// How many matches a healthy target file contains; drift is only reported
    pub expected: usize,
}

impl PatchRule {
    pub fn new(id: impl Into<String>, pattern: &str, replace: &str) -> Result<Self, RuleError> {
        let id = id.into();
        let matcher = Regex::new(pattern).map_err(|source| RuleError::Pattern {
            id: id.clone(),
            source,
        })?;
        let render = Template::parse(replace).map_err(|source| RuleError::Template {
            id: id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            matcher,
            render,
            expected: 1,
        })
    }

    pub fn expect_matches(mut self, expected: usize) -> Self {
        self.expected = expected;
        self
    }

    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    pub fn template(&self) -> &Template {
        &self.render
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.matcher.is_match(line)
    }

    /// Replace every match in `line` with the rendered version.
    ///
    /// Returns the (possibly unchanged) line and the number of matches.
    pub fn apply<'a>(&self, line: &'a str, version: &Version) -> (Cow<'a, str>, usize) {
        let count = self.matcher.find_iter(line).count();
        if count == 0 {
            return (Cow::Borrowed(line), 0);
        }
        let replacement = self.render.render(version);
        let rewritten = self.matcher.replace_all(line, NoExpand(&replacement));
        (Cow::Owned(rewritten.into_owned()), count)
    }
}
