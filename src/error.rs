use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::xml::TextPos;

pub type InstanceResult<T> = Result<T, InstanceError>;

/// Hard failures: anything that stops a whole document from being read or
/// written. Problems inside a well-formed document are [`Diagnostic`]s.
#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("XML parse error at line {line}, column {column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    AttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("Invalid UTF-8 in markup: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error("Written markup is not valid UTF-8: {0}")]
    OutputUtf8Error(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    ManifestError(#[from] serde_yaml::Error),

    #[error("Empty document: no root element found")]
    EmptyDocument,

    #[error("Multiple root elements found. A document must have exactly one root element")]
    MultipleRootElements,

    #[error(transparent)]
    QueryError(#[from] QueryError),
}

/// A syntax error in an instance query. `offset` is a character offset into
/// the query text.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Query syntax error at offset {offset}: {message}")]
pub struct QueryError {
    pub offset: usize,
    pub message: String,
}

impl QueryError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// One defect found while loading a resource. Loading never stops at the
/// first one; callers receive the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub resource: String,
    pub position: TextPos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(resource: &str, position: TextPos, message: impl Into<String>) -> Self {
        Self {
            resource: resource.to_string(),
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.resource, self.position.line, self.position.column, self.message
        )
    }
}

pub type Diagnostics = Vec<Diagnostic>;
