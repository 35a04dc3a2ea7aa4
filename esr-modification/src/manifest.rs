// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Modifications manifest parsing.

use {
    log::debug,
    std::{
        fmt::{Display, Formatter},
        io::Read,
        path::{Path, PathBuf},
    },
    thiserror::Error,
    xml::reader::{ParserConfig, XmlEvent},
};

/// Replacement text meaning "substitute the product version".
pub const VERSION_PLACEHOLDER: &str = "#Version#";

const ROOT_ELEMENT: &str = "modifications";
const REPLACE_FILE_ELEMENT: &str = "replaceFile";
const REPLACE_STRING_ELEMENT: &str = "replaceString";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unable to read manifest {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("malformed manifest document: {0}")]
    MalformedDocument(String),

    #[error("manifest root element <{}> not found (found <{found}>)", ROOT_ELEMENT)]
    MissingRoot { found: String },

    #[error("operation element {index} <{element}> lacks required <{field}>")]
    IncompleteOperation {
        index: usize,
        element: String,
        field: &'static str,
    },

    #[error("operation element {index} has illegal path {path:?}; paths must be relative and cannot contain '..'")]
    IllegalPath { index: usize, path: String },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// The replacement side of a string replacement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Replacement {
    /// Literal text from the manifest.
    Literal(String),
    /// The product version resolved for the run.
    ProductVersion,
}

impl Replacement {
    /// Resolve the text to substitute given a product version.
    pub fn resolve<'a>(&'a self, product_version: &'a str) -> &'a str {
        match self {
            Self::Literal(s) => s,
            Self::ProductVersion => product_version,
        }
    }
}

/// A single declarative modification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Replace a file or directory in the installer tree.
    ///
    /// `source` is relative to the manifest's directory. `target` is relative
    /// to the installer tree root.
    ReplaceFile { source: PathBuf, target: PathBuf },

    /// Replace all occurrences of text within a file of the installer tree.
    ReplaceString {
        file: PathBuf,
        match_text: String,
        replacement: Replacement,
    },
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReplaceFile { source, target } => {
                write!(f, "replace {} with {}", target.display(), source.display())
            }
            Self::ReplaceString {
                file,
                match_text,
                replacement,
            } => match replacement {
                Replacement::Literal(s) => {
                    write!(f, "replace {:?} with {:?} in {}", match_text, s, file.display())
                }
                Replacement::ProductVersion => write!(
                    f,
                    "replace {:?} with product version in {}",
                    match_text,
                    file.display()
                ),
            },
        }
    }
}

/// A generic XML element with its direct text content.
#[derive(Debug)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(name))
    }
}

fn read_document(reader: impl Read) -> Result<Element> {
    let events = ParserConfig::new()
        .cdata_to_characters(true)
        .create_reader(reader);

    let mut stack: Vec<Element> = vec![];
    let mut root = None;

    for event in events {
        match event.map_err(|e| ManifestError::MalformedDocument(e.to_string()))? {
            XmlEvent::StartElement { name, .. } => stack.push(Element {
                name: name.local_name,
                text: String::new(),
                children: vec![],
            }),
            XmlEvent::EndElement { .. } => {
                let element = stack.pop().ok_or_else(|| {
                    ManifestError::MalformedDocument("unbalanced end element".to_string())
                })?;

                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            XmlEvent::Characters(s) | XmlEvent::Whitespace(s) => {
                if let Some(element) = stack.last_mut() {
                    element.text.push_str(&s);
                }
            }
            _ => {}
        }
    }

    root.ok_or_else(|| ManifestError::MalformedDocument("document has no root element".to_string()))
}

/// Convert a manifest path to a relative [PathBuf].
///
/// Both `/` and `\` are accepted as separators.
fn relative_path(index: usize, raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    let illegal = || ManifestError::IllegalPath {
        index,
        path: raw.to_string(),
    };

    // A colon covers drive letters and alternate data streams.
    if raw.starts_with('/') || raw.starts_with('\\') || raw.contains(':') {
        return Err(illegal());
    }

    let mut path = PathBuf::new();
    for component in raw.split(|c| c == '/' || c == '\\') {
        match component {
            "" | "." => {}
            ".." => return Err(illegal()),
            c => path.push(c),
        }
    }

    Ok(path)
}

/// An ordered list of operations parsed from a manifest document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    operations: Vec<Operation>,
}

impl Manifest {
    /// Parse a manifest from its XML text.
    pub fn parse(document: &str) -> Result<Self> {
        Self::from_reader(document.as_bytes())
    }

    /// Parse a manifest from a reader of XML data.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Self::from_root(read_document(reader)?)
    }

    /// Parse the manifest file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh =
            std::fs::File::open(path).map_err(|e| ManifestError::Io(path.to_path_buf(), e))?;

        Self::from_reader(std::io::BufReader::new(fh))
    }

    fn from_root(root: Element) -> Result<Self> {
        if !root.is(ROOT_ELEMENT) {
            return Err(ManifestError::MissingRoot { found: root.name });
        }

        let mut operations = vec![];

        for (index, element) in root.children.iter().enumerate() {
            let text = |field: &'static str| {
                element
                    .child(field)
                    .map(|c| c.text.as_str())
                    .ok_or_else(|| ManifestError::IncompleteOperation {
                        index,
                        element: element.name.clone(),
                        field,
                    })
            };
            let non_empty = |field: &'static str| {
                text(field).and_then(|s| {
                    if s.trim().is_empty() {
                        Err(ManifestError::IncompleteOperation {
                            index,
                            element: element.name.clone(),
                            field,
                        })
                    } else {
                        Ok(s)
                    }
                })
            };

            let operation = if element.is(REPLACE_FILE_ELEMENT) {
                Operation::ReplaceFile {
                    source: relative_path(index, non_empty("source")?)?,
                    target: relative_path(index, non_empty("target")?)?,
                }
            } else if element.is(REPLACE_STRING_ELEMENT) {
                let target = text("target")?;

                Operation::ReplaceString {
                    file: relative_path(index, non_empty("file")?)?,
                    match_text: non_empty("source")?.to_string(),
                    replacement: if target.trim() == VERSION_PLACEHOLDER {
                        Replacement::ProductVersion
                    } else {
                        Replacement::Literal(target.to_string())
                    },
                }
            } else {
                debug!("ignoring unrecognized manifest element <{}>", element.name);
                continue;
            };

            operations.push(operation);
        }

        Ok(Self { operations })
    }

    /// The operations in document order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl From<Vec<Operation>> for Manifest {
    fn from(operations: Vec<Operation>) -> Self {
        Self { operations }
    }
}
