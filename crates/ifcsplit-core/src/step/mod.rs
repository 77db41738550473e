//! STEP Physical File Support
//!
//! Reading and writing of the ISO 10303-21 clear-text encoding used by
//! `.ifc` files:
//!
//! ```text
//! ISO-10303-21;
//! HEADER;
//! FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
//! FILE_SCHEMA(('IFC4'));
//! ENDSEC;
//! DATA;
//! #1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'Project',$,$,$,$,$,$);
//! ENDSEC;
//! END-ISO-10303-21;
//! ```
//!
//! The header section is kept verbatim so partition files can re-emit it.

mod parser;
mod writer;

pub use parser::{parse_str, read_model};
pub use writer::{format_entity, format_real, write_document};

use crate::graph::GraphError;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a STEP file
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a STEP physical file: missing ISO-10303-21 signature")]
    MissingSignature,

    #[error("missing DATA section")]
    MissingData,

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("line {line}: complex instance #{id} is not supported")]
    ComplexInstance { line: usize, id: u64 },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Byte encoding of the file text.
///
/// Files that are not valid UTF-8 are read as ISO-8859-1, one char per byte,
/// and written back the same way so string literals survive unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Decode file bytes, falling back to Latin-1 when they are not UTF-8
    pub fn decode(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
        match std::str::from_utf8(bytes) {
            Ok(text) => (Cow::Borrowed(text), TextEncoding::Utf8),
            Err(_) => (
                Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
                TextEncoding::Latin1,
            ),
        }
    }

    /// Encode text for writing.
    ///
    /// Under Latin-1, chars above U+00FF become `\X2\…\X0\` escapes.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            TextEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Latin1 if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Latin1 => {
                let mut out = Vec::with_capacity(text.len());
                for c in text.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(byte) => out.push(byte),
                        Err(_) => {
                            let mut units = [0u16; 2];
                            out.extend_from_slice(b"\\X2\\");
                            for unit in c.encode_utf16(&mut units) {
                                out.extend_from_slice(format!("{:04X}", unit).as_bytes());
                            }
                            out.extend_from_slice(b"\\X0\\");
                        }
                    }
                }
                Cow::Owned(out)
            }
        }
    }
}

/// The HEADER section of a STEP file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHeader {
    /// Header statements without their terminating `;`
    statements: Vec<String>,
    /// First schema named by `FILE_SCHEMA`
    schema: String,
    encoding: TextEncoding,
}

impl StepHeader {
    /// Create a minimal header for the given schema
    pub fn new(schema: &str) -> Self {
        Self {
            statements: vec![
                "FILE_DESCRIPTION((''),'2;1')".to_string(),
                format!(
                    "FILE_NAME('','',(''),(''),'ifcsplit {}','ifcsplit','')",
                    env!("CARGO_PKG_VERSION")
                ),
                format!("FILE_SCHEMA(('{}'))", schema),
            ],
            schema: schema.to_string(),
            encoding: TextEncoding::Utf8,
        }
    }

    /// Build a header from parsed statements
    pub fn from_statements(statements: Vec<String>) -> Self {
        let schema = statements
            .iter()
            .find(|s| s.trim_start().starts_with("FILE_SCHEMA"))
            .and_then(|s| first_quoted(s))
            .unwrap_or_default();
        Self {
            statements,
            schema,
            encoding: TextEncoding::Utf8,
        }
    }

    /// Set the encoding partition files are written in
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Get the text encoding of the source file
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Get the schema identifier (e.g. `IFC2X3`)
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Get the raw header statements
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// First string of `FILE_DESCRIPTION`, if any
    pub fn description(&self) -> Option<String> {
        self.statements
            .iter()
            .find(|s| s.trim_start().starts_with("FILE_DESCRIPTION"))
            .and_then(|s| first_quoted(s))
    }
}

fn first_quoted(statement: &str) -> Option<String> {
    let start = statement.find('\'')? + 1;
    let len = statement[start..].find('\'')?;
    Some(statement[start..start + len].to_string())
}

/// Decode the STEP string escapes (`\X2\…\X0\`, `\X4\…\X0\`, `\X\hh`,
/// `\S\c`, `\\`) into plain text. Unknown escapes are kept literally.
pub fn decode_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            let units: Vec<u16> = tail[..end]
                .as_bytes()
                .chunks(4)
                .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                .filter_map(|hex| u16::from_str_radix(hex, 16).ok())
                .collect();
            out.extend(
                char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X4\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            out.extend(
                tail[..end]
                    .as_bytes()
                    .chunks(8)
                    .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                    .filter_map(|hex| u32::from_str_radix(hex, 16).ok())
                    .map(|code| char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            match tail.get(..2).and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                Some(byte) => {
                    out.push(char::from(byte));
                    rest = &tail[2..];
                }
                None => {
                    out.push('\\');
                    rest = &rest[1..];
                }
            }
        } else if let Some(tail) = rest.strip_prefix("\\S\\") {
            let mut chars = tail.chars();
            match chars.next() {
                Some(c) if c.is_ascii() => {
                    out.push(char::from(c as u8 + 128));
                    rest = chars.as_str();
                }
                _ => {
                    out.push('\\');
                    rest = &rest[1..];
                }
            }
        } else if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if rest.len() >= 4 && rest.starts_with("\\P") && rest.as_bytes()[3] == b'\\' {
            // Code page switch (`\PA\`); no effect on decoded text
            rest = &rest[4..];
        } else {
            out.push('\\');
            rest = &rest[1..];
        }
    }

    out.push_str(rest);
    out
}
