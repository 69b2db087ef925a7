//! Parsing for `protocol:path[#fragment]` reference values
//!
//! Used for `extends` attributes and for reference strings in markup.
//!
//! # Supported Formats
//!
//! 1. **Short form**: `id:baseEl`, `file:shared/base.xml#persona`
//! 2. **Authority form**: `https://example.com/prompts.json` (the `//` is
//!    dropped from the path so that it matches `Reference::path`)
//!
//! # Examples
//!
//! ```
//! use promptdoc_engine::uri::ReferenceUri;
//!
//! let uri = ReferenceUri::parse("file:shared/base.xml#persona").unwrap();
//! assert_eq!(uri.protocol(), "file");
//! assert_eq!(uri.path(), "shared/base.xml");
//! assert_eq!(uri.fragment(), Some("persona"));
//! assert_eq!(uri.key(), "file:shared/base.xml");
//!
//! let uri = ReferenceUri::parse("https://example.com/r").unwrap();
//! assert_eq!(uri.path(), "example.com/r");
//! ```

use crate::ast::Reference;
use crate::error::{ProcessError, Result};

/// Parsed reference value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUri {
    /// Original string
    uri: String,
    /// Protocol (e.g., "id", "file", "https"), lowercased
    protocol: String,
    /// Protocol-specific path
    path: String,
    /// Optional fragment after `#`
    fragment: Option<String>,
}

impl ReferenceUri {
    /// Parse a reference string into components.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::InvalidUri` when the protocol or path is missing,
    /// or the protocol contains characters outside `[A-Za-z0-9+.-]`.
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        let colon = trimmed.find(':').ok_or_else(|| {
            ProcessError::InvalidUri(format!("expected protocol:path, got: {}", uri))
        })?;

        let (protocol, rest) = trimmed.split_at(colon);
        let rest = &rest[1..]; // Skip the :

        if protocol.is_empty() {
            return Err(ProcessError::InvalidUri(format!(
                "protocol cannot be empty, got: {}",
                uri
            )));
        }
        let valid_protocol = protocol
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_alphabetic() || (i > 0 && (c.is_ascii_digit() || "+.-".contains(c))));
        if !valid_protocol {
            return Err(ProcessError::InvalidUri(format!(
                "invalid protocol '{}' in: {}",
                protocol, uri
            )));
        }

        // Split off the fragment
        let (path, fragment) = match rest.find('#') {
            Some(hash_pos) => {
                let (path, frag) = rest.split_at(hash_pos);
                let frag = &frag[1..];
                (path, (!frag.is_empty()).then(|| frag.to_string()))
            }
            None => (rest, None),
        };

        let path = path.strip_prefix("//").unwrap_or(path);
        if path.is_empty() {
            return Err(ProcessError::InvalidUri(format!(
                "path cannot be empty, got: {}",
                uri
            )));
        }

        Ok(Self {
            uri: trimmed.to_string(),
            protocol: protocol.to_ascii_lowercase(),
            path: path.to_string(),
            fragment,
        })
    }

    /// Get the original string
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Cache key: `protocol:path`, without the fragment.
    pub fn key(&self) -> String {
        format!("{}:{}", self.protocol, self.path)
    }

    /// Reference node pointing at the same target.
    pub fn to_reference(&self) -> Reference {
        Reference::new(self.protocol.clone(), self.path.clone())
    }
}

impl std::fmt::Display for ReferenceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}
