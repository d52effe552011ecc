//! Plain tree-walking document reader

use bson::{Bson, Document};

use super::{ContainerKind, DocumentReader, ElementKind, FrameMark, MarkState, ReaderMark};
use crate::errors::{MappingError, MappingResult};

/// A borrowed element: either a plain value or a root document.
#[derive(Debug, Clone, Copy)]
enum Item<'a> {
    Value(&'a Bson),
    Document(&'a Document),
}

impl<'a> Item<'a> {
    fn kind(&self) -> ElementKind {
        match self {
            Item::Value(value) => ElementKind::of(value),
            Item::Document(_) => ElementKind::Document,
        }
    }

    fn to_bson(self) -> Bson {
        match self {
            Item::Value(value) => value.clone(),
            Item::Document(doc) => Bson::Document(doc.clone()),
        }
    }

    fn as_document(self) -> Option<&'a Document> {
        match self {
            Item::Value(Bson::Document(doc)) => Some(doc),
            Item::Document(doc) => Some(doc),
            Item::Value(_) => None,
        }
    }

    fn as_array(self) -> Option<&'a [Bson]> {
        match self {
            Item::Value(Bson::Array(items)) => Some(items.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Container<'a> {
    Root(Item<'a>),
    Document(&'a Document),
    Array(&'a [Bson]),
}

#[derive(Debug)]
struct Frame<'a> {
    container: Container<'a>,
    /// `(name, value)` pairs of a document frame, collected once on entry
    entries: Vec<(&'a str, &'a Bson)>,
    entered_at: usize,
    position: usize,
    name_read: bool,
}

impl<'a> Frame<'a> {
    fn new(container: Container<'a>, entered_at: usize) -> Self {
        let entries = match container {
            Container::Document(doc) => doc.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            _ => Vec::new(),
        };
        Self {
            container,
            entries,
            entered_at,
            position: 0,
            name_read: false,
        }
    }

    fn kind(&self) -> ContainerKind {
        match self.container {
            Container::Root(_) => ContainerKind::Root,
            Container::Document(_) => ContainerKind::Document,
            Container::Array(_) => ContainerKind::Array,
        }
    }

    fn len(&self) -> usize {
        match self.container {
            Container::Root(_) => 1,
            Container::Document(_) => self.entries.len(),
            Container::Array(items) => items.len(),
        }
    }

    fn element(&self, index: usize) -> Option<Item<'a>> {
        match self.container {
            Container::Root(item) => (index == 0).then_some(item),
            Container::Document(_) => self.entries.get(index).map(|(_, v)| Item::Value(*v)),
            Container::Array(items) => items.get(index).map(Item::Value),
        }
    }

    fn end_kind(&self) -> ElementKind {
        match self.container {
            Container::Array(_) => ElementKind::EndOfArray,
            _ => ElementKind::EndOfDocument,
        }
    }
}

/// Reader over a borrowed BSON document or value.
///
/// The reader starts positioned on the root value; call `read_start_document`
/// to enter a root document.
#[derive(Debug)]
pub struct BsonDocumentReader<'a> {
    root: Item<'a>,
    frames: Vec<Frame<'a>>,
}

impl<'a> BsonDocumentReader<'a> {
    /// Creates a reader over a document.
    pub fn new(document: &'a Document) -> Self {
        Self::with_root(Item::Document(document))
    }

    /// Creates a reader positioned on an arbitrary value.
    pub fn from_value(value: &'a Bson) -> Self {
        Self::with_root(Item::Value(value))
    }

    fn with_root(root: Item<'a>) -> Self {
        Self {
            root,
            frames: vec![Frame::new(Container::Root(root), 0)],
        }
    }

    /// Depth of open containers, the root frame excluded
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn top(&self) -> MappingResult<&Frame<'a>> {
        self.frames
            .last()
            .ok_or_else(|| MappingError::invalid_state("reader has no open frame"))
    }

    fn top_mut(&mut self) -> MappingResult<&mut Frame<'a>> {
        self.frames
            .last_mut()
            .ok_or_else(|| MappingError::invalid_state("reader has no open frame"))
    }

    /// Returns the value at the cursor without consuming it.
    fn pending(&self) -> MappingResult<Item<'a>> {
        let frame = self.top()?;
        if frame.kind() == ContainerKind::Document && !frame.name_read {
            return Err(MappingError::invalid_state("value read before its name"));
        }
        frame
            .element(frame.position)
            .ok_or_else(|| MappingError::invalid_state(format!("no value left: {}", frame.end_kind())))
    }

    /// Consumes the value at the cursor and returns it with its index.
    fn take(&mut self) -> MappingResult<(usize, Item<'a>)> {
        let item = self.pending()?;
        let frame = self.top_mut()?;
        let index = frame.position;
        frame.position += 1;
        frame.name_read = false;
        Ok((index, item))
    }

    fn end_container(&mut self, expected: ContainerKind) -> MappingResult<()> {
        let frame = self.top()?;
        if frame.kind() != expected {
            return Err(MappingError::invalid_state(format!(
                "cannot end {:?} while inside {:?}",
                expected,
                frame.kind()
            )));
        }
        self.frames.pop();
        Ok(())
    }
}

impl<'a> DocumentReader for BsonDocumentReader<'a> {
    fn peek_kind(&self) -> ElementKind {
        match self.frames.last() {
            Some(frame) => match frame.element(frame.position) {
                Some(item) => item.kind(),
                None => frame.end_kind(),
            },
            None => ElementKind::EndOfDocument,
        }
    }

    fn read_start_document(&mut self) -> MappingResult<()> {
        let item = self.pending()?;
        let doc = item
            .as_document()
            .ok_or_else(|| MappingError::malformed("document", item.kind().as_str()))?;
        let (index, _) = self.take()?;
        self.frames.push(Frame::new(Container::Document(doc), index));
        Ok(())
    }

    fn read_end_document(&mut self) -> MappingResult<()> {
        self.end_container(ContainerKind::Document)
    }

    fn read_start_array(&mut self) -> MappingResult<()> {
        let item = self.pending()?;
        let items = item
            .as_array()
            .ok_or_else(|| MappingError::malformed("array", item.kind().as_str()))?;
        let (index, _) = self.take()?;
        self.frames.push(Frame::new(Container::Array(items), index));
        Ok(())
    }

    fn read_end_array(&mut self) -> MappingResult<()> {
        self.end_container(ContainerKind::Array)
    }

    fn read_name(&mut self) -> MappingResult<String> {
        let frame = self.top_mut()?;
        if frame.kind() != ContainerKind::Document {
            return Err(MappingError::invalid_state("names exist only inside documents"));
        }
        if frame.name_read {
            return Err(MappingError::invalid_state("name already read"));
        }
        let name: &'a str = frame
            .entries
            .get(frame.position)
            .map(|(name, _)| *name)
            .ok_or_else(|| MappingError::invalid_state("no name left: end of document"))?;
        frame.name_read = true;
        Ok(name.to_string())
    }

    fn read_value(&mut self) -> MappingResult<Bson> {
        self.take().map(|(_, item)| item.to_bson())
    }

    fn skip_value(&mut self) -> MappingResult<()> {
        self.take().map(|_| ())
    }

    fn mark(&self) -> ReaderMark {
        ReaderMark {
            state: MarkState::Tree(
                self.frames
                    .iter()
                    .map(|f| FrameMark {
                        kind: f.kind(),
                        entered_at: f.entered_at,
                        position: f.position,
                        name_read: f.name_read,
                    })
                    .collect(),
            ),
        }
    }

    fn reset(&mut self, mark: &ReaderMark) -> MappingResult<()> {
        let MarkState::Tree(marks) = &mark.state else {
            return Err(MappingError::invalid_state("mark taken from a different reader kind"));
        };

        // Re-walk from the root: each frame was entered from the element its
        // parent recorded in `entered_at`.
        let mut frames: Vec<Frame<'a>> = Vec::with_capacity(marks.len());
        for (depth, m) in marks.iter().enumerate() {
            let container = if depth == 0 {
                Container::Root(self.root)
            } else {
                let item = frames[depth - 1].element(m.entered_at).ok_or_else(|| {
                    MappingError::invalid_state("mark does not belong to this document")
                })?;
                match m.kind {
                    ContainerKind::Document => item.as_document().map(Container::Document),
                    ContainerKind::Array => item.as_array().map(Container::Array),
                    ContainerKind::Root => None,
                }
                .ok_or_else(|| MappingError::invalid_state("mark does not belong to this document"))?
            };
            let mut frame = Frame::new(container, m.entered_at);
            if m.position > frame.len() {
                return Err(MappingError::invalid_state("mark does not belong to this document"));
            }
            frame.position = m.position;
            frame.name_read = m.name_read;
            frames.push(frame);
        }
        self.frames = frames;
        Ok(())
    }
}
