//! Flattened document reader
//!
//! The document is flattened once into a token stream. Every value, name and
//! container boundary becomes one token tagged with its dotted path, so the
//! reader can answer path-qualified lookups (`find("list.1.name")`) without
//! any per-level traversal, while still exposing the ordinary forward cursor
//! contract over the same tokens.

use std::collections::HashMap;

use bson::{Bson, Document};

use super::{
    join_path, BsonDocumentReader, ContainerKind, DocumentReader, ElementKind, FlatFrame,
    MarkState, ReaderMark,
};
use crate::errors::{MappingError, MappingResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    StartDocument,
    EndDocument,
    StartArray,
    EndArray,
    Name(String),
    Value(Bson),
}

#[derive(Debug, Clone)]
struct Entry {
    token: Token,
    path: String,
}

/// Token-stream reader with path-qualified access.
///
/// Not safe for concurrent use: the frame stack is single-cursor state.
#[derive(Debug, Clone)]
pub struct FlattenedDocumentReader {
    entries: Vec<Entry>,
    /// Start token index -> matching end token index
    ends: HashMap<usize, usize>,
    /// Dotted path -> index of the token that starts the value.
    /// When a literal dotted name and a nested path collide, the first wins.
    paths: HashMap<String, usize>,
    position: usize,
    frames: Vec<FlatFrame>,
}

impl FlattenedDocumentReader {
    /// Flattens a whole document.
    pub fn new(document: &Document) -> MappingResult<Self> {
        let mut reader = BsonDocumentReader::new(document);
        Self::from_reader(&mut reader)
    }

    /// Drains the value at the cursor of `reader` and flattens it.
    ///
    /// The source reader is left positioned after the drained value.
    pub fn from_reader(reader: &mut dyn DocumentReader) -> MappingResult<Self> {
        let mut flattened = Self {
            entries: Vec::new(),
            ends: HashMap::new(),
            paths: HashMap::new(),
            position: 0,
            frames: Vec::new(),
        };
        flattened.drain(reader, String::new())?;
        let root_end = flattened.entries.len();
        flattened.frames.push(FlatFrame {
            kind: ContainerKind::Root,
            start: 0,
            end: root_end,
        });
        Ok(flattened)
    }

    fn push(&mut self, token: Token, path: &str) -> usize {
        self.entries.push(Entry {
            token,
            path: path.to_string(),
        });
        self.entries.len() - 1
    }

    fn record_path(&mut self, path: String, index: usize) {
        self.paths.entry(path).or_insert(index);
    }

    fn drain(&mut self, reader: &mut dyn DocumentReader, path: String) -> MappingResult<()> {
        match reader.peek_kind() {
            ElementKind::Document => {
                reader.read_start_document()?;
                let start = self.push(Token::StartDocument, &path);
                self.record_path(path.clone(), start);
                while reader.peek_kind() != ElementKind::EndOfDocument {
                    let name = reader.read_name()?;
                    let child = join_path(&path, &name);
                    self.push(Token::Name(name), &child);
                    self.drain(reader, child)?;
                }
                reader.read_end_document()?;
                let end = self.push(Token::EndDocument, &path);
                self.ends.insert(start, end);
            }
            ElementKind::Array => {
                reader.read_start_array()?;
                let start = self.push(Token::StartArray, &path);
                self.record_path(path.clone(), start);
                let mut index = 0usize;
                while reader.peek_kind() != ElementKind::EndOfArray {
                    self.drain(reader, join_path(&path, &index.to_string()))?;
                    index += 1;
                }
                reader.read_end_array()?;
                let end = self.push(Token::EndArray, &path);
                self.ends.insert(start, end);
            }
            ElementKind::EndOfDocument | ElementKind::EndOfArray => {
                return Err(MappingError::invalid_state("no value to flatten"));
            }
            _ => {
                let value = reader.read_value()?;
                let index = self.push(Token::Value(value), &path);
                self.record_path(path, index);
            }
        }
        Ok(())
    }

    /// Returns the value stored at a dotted path, containers included.
    ///
    /// The empty path addresses the root value. The cursor does not move.
    pub fn find(&self, path: &str) -> Option<Bson> {
        let index = *self.paths.get(path)?;
        self.materialize(index).ok().map(|(value, _)| value)
    }

    /// Returns the kind of the value stored at a dotted path.
    pub fn kind_at(&self, path: &str) -> Option<ElementKind> {
        let index = *self.paths.get(path)?;
        Some(self.kind_of(index))
    }

    /// Returns true if a value exists at the path.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// All value paths in document order.
    pub fn paths(&self) -> Vec<&str> {
        let mut indexed: Vec<(&usize, &String)> =
            self.paths.iter().map(|(path, index)| (index, path)).collect();
        indexed.sort();
        indexed.into_iter().map(|(_, path)| path.as_str()).collect()
    }

    /// Dotted path of the element at the cursor.
    pub fn current_path(&self) -> Option<&str> {
        self.entries.get(self.position).map(|e| e.path.as_str())
    }

    fn kind_of(&self, index: usize) -> ElementKind {
        match self.entries.get(index).map(|e| &e.token) {
            Some(Token::StartDocument) => ElementKind::Document,
            Some(Token::StartArray) => ElementKind::Array,
            Some(Token::Value(value)) => ElementKind::of(value),
            Some(Token::Name(_)) => self.kind_of(index + 1),
            Some(Token::EndArray) => ElementKind::EndOfArray,
            Some(Token::EndDocument) | None => ElementKind::EndOfDocument,
        }
    }

    fn end_of(&self, start: usize) -> MappingResult<usize> {
        self.ends
            .get(&start)
            .copied()
            .ok_or_else(|| MappingError::Internal(format!("unbalanced token stream at {}", start)))
    }

    /// Rebuilds the value starting at `index`; returns it with the index of
    /// the first token after it.
    fn materialize(&self, index: usize) -> MappingResult<(Bson, usize)> {
        match self.entries.get(index).map(|e| &e.token) {
            Some(Token::Value(value)) => Ok((value.clone(), index + 1)),
            Some(Token::StartDocument) => {
                let end = self.end_of(index)?;
                let mut document = Document::new();
                let mut cursor = index + 1;
                while cursor < end {
                    let Some(Token::Name(name)) = self.entries.get(cursor).map(|e| &e.token) else {
                        return Err(MappingError::Internal("expected name token".into()));
                    };
                    let (value, next) = self.materialize(cursor + 1)?;
                    document.insert(name.clone(), value);
                    cursor = next;
                }
                Ok((Bson::Document(document), end + 1))
            }
            Some(Token::StartArray) => {
                let end = self.end_of(index)?;
                let mut items = Vec::new();
                let mut cursor = index + 1;
                while cursor < end {
                    let (value, next) = self.materialize(cursor)?;
                    items.push(value);
                    cursor = next;
                }
                Ok((Bson::Array(items), end + 1))
            }
            _ => Err(MappingError::invalid_state("no value at cursor")),
        }
    }

    fn top(&self) -> MappingResult<FlatFrame> {
        self.frames
            .last()
            .copied()
            .ok_or_else(|| MappingError::invalid_state("reader has no open frame"))
    }

    /// Index of the value token at the cursor, enforcing name-before-value.
    fn pending(&self) -> MappingResult<usize> {
        let frame = self.top()?;
        match self.entries.get(self.position).map(|e| &e.token) {
            Some(Token::Name(_)) => Err(MappingError::invalid_state("value read before its name")),
            Some(Token::Value(_)) | Some(Token::StartDocument) | Some(Token::StartArray)
                if self.position < frame.end =>
            {
                Ok(self.position)
            }
            _ => Err(MappingError::invalid_state(format!(
                "no value left: {}",
                self.peek_kind()
            ))),
        }
    }

    fn start_container(&mut self, kind: ContainerKind) -> MappingResult<()> {
        let index = self.pending()?;
        let (token_kind, expected) = match kind {
            ContainerKind::Array => (ElementKind::Array, "array"),
            _ => (ElementKind::Document, "document"),
        };
        let found = self.kind_of(index);
        if found != token_kind {
            return Err(MappingError::malformed(expected, found.as_str()));
        }
        let end = self.end_of(index)?;
        self.frames.push(FlatFrame {
            kind,
            start: index,
            end,
        });
        self.position = index + 1;
        Ok(())
    }

    fn end_container(&mut self, kind: ContainerKind) -> MappingResult<()> {
        let frame = self.top()?;
        if frame.kind != kind {
            return Err(MappingError::invalid_state(format!(
                "cannot end {:?} while inside {:?}",
                kind, frame.kind
            )));
        }
        // Skip whatever is left unread in the container
        self.position = frame.end + 1;
        self.frames.pop();
        Ok(())
    }
}

impl DocumentReader for FlattenedDocumentReader {
    fn peek_kind(&self) -> ElementKind {
        match self.frames.last() {
            Some(frame) if self.position >= frame.end => match frame.kind {
                ContainerKind::Array => ElementKind::EndOfArray,
                _ => ElementKind::EndOfDocument,
            },
            Some(_) => self.kind_of(self.position),
            None => ElementKind::EndOfDocument,
        }
    }

    fn read_start_document(&mut self) -> MappingResult<()> {
        self.start_container(ContainerKind::Document)
    }

    fn read_end_document(&mut self) -> MappingResult<()> {
        self.end_container(ContainerKind::Document)
    }

    fn read_start_array(&mut self) -> MappingResult<()> {
        self.start_container(ContainerKind::Array)
    }

    fn read_end_array(&mut self) -> MappingResult<()> {
        self.end_container(ContainerKind::Array)
    }

    fn read_name(&mut self) -> MappingResult<String> {
        let frame = self.top()?;
        if frame.kind != ContainerKind::Document {
            return Err(MappingError::invalid_state("names exist only inside documents"));
        }
        match self.entries.get(self.position).map(|e| &e.token) {
            Some(Token::Name(name)) if self.position < frame.end => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            Some(Token::EndDocument) | None => {
                Err(MappingError::invalid_state("no name left: end of document"))
            }
            _ => Err(MappingError::invalid_state("name already read")),
        }
    }

    fn read_value(&mut self) -> MappingResult<Bson> {
        let index = self.pending()?;
        let (value, next) = self.materialize(index)?;
        self.position = next;
        Ok(value)
    }

    fn skip_value(&mut self) -> MappingResult<()> {
        let index = self.pending()?;
        self.position = match self.entries[index].token {
            Token::StartDocument | Token::StartArray => self.end_of(index)? + 1,
            _ => index + 1,
        };
        Ok(())
    }

    fn mark(&self) -> ReaderMark {
        ReaderMark {
            state: MarkState::Flat {
                position: self.position,
                frames: self.frames.clone(),
            },
        }
    }

    fn reset(&mut self, mark: &ReaderMark) -> MappingResult<()> {
        let MarkState::Flat { position, frames } = &mark.state else {
            return Err(MappingError::invalid_state("mark taken from a different reader kind"));
        };
        if *position > self.entries.len() || frames.iter().any(|f| f.end > self.entries.len()) {
            return Err(MappingError::invalid_state("mark does not belong to this document"));
        }
        self.position = *position;
        self.frames = frames.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_path_lookup() {
        let document = doc! {
            "key": { "nested": "detsen" },
            "list": [ { "name": "a" }, { "name": "b" } ],
        };
        let reader = FlattenedDocumentReader::new(&document).unwrap();

        assert_eq!(reader.find("key.nested"), Some(Bson::String("detsen".into())));
        assert_eq!(reader.find("list.1.name"), Some(Bson::String("b".into())));
        assert_eq!(reader.find("list.0"), Some(Bson::Document(doc! { "name": "a" })));
        assert_eq!(reader.kind_at("list"), Some(ElementKind::Array));
        assert_eq!(reader.find("missing"), None);
        assert_eq!(reader.find(""), Some(Bson::Document(document.clone())));
    }

    #[test]
    fn test_colliding_paths_keep_first_occurrence() {
        let document = doc! { "a.b": 1, "a": { "b": 2 } };
        let reader = FlattenedDocumentReader::new(&document).unwrap();

        assert_eq!(reader.find("a.b"), Some(Bson::Int32(1)));
        assert_eq!(reader.find("a"), Some(Bson::Document(doc! { "b": 2 })));
        assert_eq!(reader.paths(), vec!["", "a.b", "a"]);
    }

    #[test]
    fn test_paths_in_document_order() {
        let document = doc! { "b": 1, "a": [true] };
        let reader = FlattenedDocumentReader::new(&document).unwrap();
        assert_eq!(reader.paths(), vec!["", "b", "a", "a.0"]);
    }

    #[test]
    fn test_from_reader_drains_only_current_value() {
        let document = doc! { "ref": { "$ref": "author", "$id": 42 }, "title": "x" };
        let mut source = BsonDocumentReader::new(&document);
        source.read_start_document().unwrap();
        source.read_name().unwrap();

        let flattened = FlattenedDocumentReader::from_reader(&mut source).unwrap();
        assert_eq!(flattened.find("$id"), Some(Bson::Int32(42)));
        assert_eq!(source.read_name().unwrap(), "title");
    }

    #[test]
    fn test_end_array_skips_unread() {
        let document = doc! { "numbers": [1, 2, 3], "after": "x" };
        let mut reader = FlattenedDocumentReader::new(&document).unwrap();
        reader.read_start_document().unwrap();
        reader.read_name().unwrap();
        reader.read_start_array().unwrap();
        assert_eq!(reader.read_int32().unwrap(), 1);
        reader.read_end_array().unwrap();
        assert_eq!(reader.read_name().unwrap(), "after");
        assert_eq!(reader.current_path(), Some("after"));
        assert_eq!(reader.read_string().unwrap(), "x");
    }

    #[test]
    fn test_read_value_rebuilds_containers() {
        let document = doc! { "sub": { "a": [1, { "b": 2 }] } };
        let mut reader = FlattenedDocumentReader::new(&document).unwrap();
        reader.read_start_document().unwrap();
        reader.read_name().unwrap();
        let value = reader.read_value().unwrap();
        assert_eq!(value, Bson::Document(doc! { "a": [1, { "b": 2 }] }));
        assert_eq!(reader.peek_kind(), ElementKind::EndOfDocument);
    }
}
