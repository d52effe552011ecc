//! Document cursor subsystem
//!
//! Codecs never touch `bson::Document` trees directly; they read and write
//! through the cursor contracts defined here.
//!
//! # Readers
//!
//! - `BsonDocumentReader`: plain tree-walking reader over a borrowed document
//! - `FlattenedDocumentReader`: token-stream reader with path-qualified access
//!
//! Both readers expose the identical `DocumentReader` contract. Driven in
//! lockstep over the same document they observe the same token sequence.
//!
//! # Marks
//!
//! `mark()` returns a `ReaderMark`, an owned snapshot of the reader's frame
//! stack. `reset()` restores that snapshot exactly; later reads never affect
//! a mark already taken.

mod flattened;
mod reader;
mod writer;

pub use flattened::FlattenedDocumentReader;
pub use reader::BsonDocumentReader;
pub use writer::BsonDocumentWriter;

use std::fmt;

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::Bson;

use crate::errors::{MappingError, MappingResult};

/// Kind of the next element visible to a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Double,
    String,
    Document,
    Array,
    Binary,
    ObjectId,
    Boolean,
    DateTime,
    Null,
    Int32,
    Int64,
    /// Any BSON type the mapper has no dedicated codec for
    Other,
    /// No unread elements remain in the current document
    EndOfDocument,
    /// No unread elements remain in the current array
    EndOfArray,
}

impl ElementKind {
    /// Returns the kind of a BSON value
    pub fn of(value: &Bson) -> Self {
        match value {
            Bson::Double(_) => ElementKind::Double,
            Bson::String(_) => ElementKind::String,
            Bson::Document(_) => ElementKind::Document,
            Bson::Array(_) => ElementKind::Array,
            Bson::Binary(_) => ElementKind::Binary,
            Bson::ObjectId(_) => ElementKind::ObjectId,
            Bson::Boolean(_) => ElementKind::Boolean,
            Bson::DateTime(_) => ElementKind::DateTime,
            Bson::Null => ElementKind::Null,
            Bson::Int32(_) => ElementKind::Int32,
            Bson::Int64(_) => ElementKind::Int64,
            _ => ElementKind::Other,
        }
    }

    /// Returns the kind name for error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Double => "double",
            ElementKind::String => "string",
            ElementKind::Document => "document",
            ElementKind::Array => "array",
            ElementKind::Binary => "binary",
            ElementKind::ObjectId => "objectId",
            ElementKind::Boolean => "bool",
            ElementKind::DateTime => "date",
            ElementKind::Null => "null",
            ElementKind::Int32 => "int32",
            ElementKind::Int64 => "int64",
            ElementKind::Other => "other",
            ElementKind::EndOfDocument => "end of document",
            ElementKind::EndOfArray => "end of array",
        }
    }

    /// Returns true for document and array kinds
    pub fn is_container(&self) -> bool {
        matches!(self, ElementKind::Document | ElementKind::Array)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of an open container frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContainerKind {
    Root,
    Document,
    Array,
}

/// Snapshot of one tree-reader frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameMark {
    pub kind: ContainerKind,
    pub entered_at: usize,
    pub position: usize,
    pub name_read: bool,
}

/// Snapshot of one flattened-reader frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlatFrame {
    pub kind: ContainerKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MarkState {
    Tree(Vec<FrameMark>),
    Flat { position: usize, frames: Vec<FlatFrame> },
}

/// Owned snapshot of a reader's position.
///
/// A mark holds copies of every frame and cursor position, so it stays valid
/// no matter how far the reader advances afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderMark {
    pub(crate) state: MarkState,
}

impl ReaderMark {
    /// Number of open frames captured by the mark
    pub fn depth(&self) -> usize {
        match &self.state {
            MarkState::Tree(frames) => frames.len(),
            MarkState::Flat { frames, .. } => frames.len(),
        }
    }
}

/// Forward cursor over a hierarchical document.
///
/// Inside a document frame every value must be preceded by `read_name`.
/// `read_end_document` / `read_end_array` skip any unread elements.
pub trait DocumentReader {
    /// Kind of the next unread element in the current frame
    fn peek_kind(&self) -> ElementKind;

    /// Enter the sub-document at the cursor
    fn read_start_document(&mut self) -> MappingResult<()>;

    /// Leave the current document, skipping unread elements
    fn read_end_document(&mut self) -> MappingResult<()>;

    /// Enter the array at the cursor
    fn read_start_array(&mut self) -> MappingResult<()>;

    /// Leave the current array, skipping unread elements
    fn read_end_array(&mut self) -> MappingResult<()>;

    /// Read the name of the next element of the current document
    fn read_name(&mut self) -> MappingResult<String>;

    /// Read the value at the cursor, containers included
    fn read_value(&mut self) -> MappingResult<Bson>;

    /// Skip the value at the cursor, containers included
    fn skip_value(&mut self) -> MappingResult<()>;

    /// Snapshot the current position
    fn mark(&self) -> ReaderMark;

    /// Restore a snapshot taken with `mark`
    fn reset(&mut self, mark: &ReaderMark) -> MappingResult<()>;

    /// Read a value after checking its kind
    fn read_scalar(&mut self, expected: ElementKind) -> MappingResult<Bson> {
        let kind = self.peek_kind();
        if kind != expected {
            return Err(MappingError::malformed(expected.as_str(), kind.as_str()));
        }
        self.read_value()
    }

    fn read_string(&mut self) -> MappingResult<String> {
        match self.read_scalar(ElementKind::String)? {
            Bson::String(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }

    fn read_int32(&mut self) -> MappingResult<i32> {
        match self.read_scalar(ElementKind::Int32)? {
            Bson::Int32(v) => Ok(v),
            other => Err(unexpected("int32", &other)),
        }
    }

    fn read_int64(&mut self) -> MappingResult<i64> {
        match self.read_scalar(ElementKind::Int64)? {
            Bson::Int64(v) => Ok(v),
            other => Err(unexpected("int64", &other)),
        }
    }

    fn read_double(&mut self) -> MappingResult<f64> {
        match self.read_scalar(ElementKind::Double)? {
            Bson::Double(v) => Ok(v),
            other => Err(unexpected("double", &other)),
        }
    }

    fn read_bool(&mut self) -> MappingResult<bool> {
        match self.read_scalar(ElementKind::Boolean)? {
            Bson::Boolean(v) => Ok(v),
            other => Err(unexpected("bool", &other)),
        }
    }

    fn read_null(&mut self) -> MappingResult<()> {
        self.read_scalar(ElementKind::Null).map(|_| ())
    }

    fn read_object_id(&mut self) -> MappingResult<ObjectId> {
        match self.read_scalar(ElementKind::ObjectId)? {
            Bson::ObjectId(v) => Ok(v),
            other => Err(unexpected("objectId", &other)),
        }
    }

    fn read_date_time(&mut self) -> MappingResult<bson::DateTime> {
        match self.read_scalar(ElementKind::DateTime)? {
            Bson::DateTime(v) => Ok(v),
            other => Err(unexpected("date", &other)),
        }
    }

    fn read_binary(&mut self) -> MappingResult<(BinarySubtype, Vec<u8>)> {
        match self.read_scalar(ElementKind::Binary)? {
            Bson::Binary(b) => Ok((b.subtype, b.bytes)),
            other => Err(unexpected("binary", &other)),
        }
    }
}

/// Builder-side counterpart of `DocumentReader`.
pub trait DocumentWriter {
    fn write_start_document(&mut self) -> MappingResult<()>;

    fn write_end_document(&mut self) -> MappingResult<()>;

    fn write_start_array(&mut self) -> MappingResult<()>;

    fn write_end_array(&mut self) -> MappingResult<()>;

    /// Name the next value of the current document
    fn write_name(&mut self, name: &str) -> MappingResult<()>;

    /// Write a complete value, containers included
    fn write_value(&mut self, value: Bson) -> MappingResult<()>;

    fn write_string(&mut self, value: &str) -> MappingResult<()> {
        self.write_value(Bson::String(value.to_string()))
    }

    fn write_int32(&mut self, value: i32) -> MappingResult<()> {
        self.write_value(Bson::Int32(value))
    }

    fn write_int64(&mut self, value: i64) -> MappingResult<()> {
        self.write_value(Bson::Int64(value))
    }

    fn write_double(&mut self, value: f64) -> MappingResult<()> {
        self.write_value(Bson::Double(value))
    }

    fn write_bool(&mut self, value: bool) -> MappingResult<()> {
        self.write_value(Bson::Boolean(value))
    }

    fn write_null(&mut self) -> MappingResult<()> {
        self.write_value(Bson::Null)
    }
}

fn unexpected(expected: &str, found: &Bson) -> MappingError {
    MappingError::malformed(expected, ElementKind::of(found).as_str())
}

/// Joins a parent path and a child segment with `.`
pub(crate) fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_element_kinds() {
        assert_eq!(ElementKind::of(&Bson::Int32(1)), ElementKind::Int32);
        assert_eq!(ElementKind::of(&Bson::String("a".into())), ElementKind::String);
        assert_eq!(ElementKind::of(&Bson::Document(doc! {})), ElementKind::Document);
        assert_eq!(ElementKind::of(&Bson::Symbol("s".into())), ElementKind::Other);
        assert!(ElementKind::Array.is_container());
        assert!(!ElementKind::Null.is_container());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "key"), "key");
        assert_eq!(join_path("list", "0"), "list.0");
    }

    #[test]
    fn test_typed_read_rejects_wrong_kind() {
        let document = doc! { "age": "forty" };
        let mut reader = BsonDocumentReader::new(&document);
        reader.read_start_document().unwrap();
        reader.read_name().unwrap();
        let err = reader.read_int32().unwrap_err();
        assert!(matches!(err, MappingError::Malformed { .. }));
        // The mismatched value is still unread
        assert_eq!(reader.read_string().unwrap(), "forty");
    }
}
