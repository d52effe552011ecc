//! Document builder

use bson::{Bson, Document};

use super::DocumentWriter;
use crate::errors::{MappingError, MappingResult};

#[derive(Debug)]
enum Open {
    Document {
        doc: Document,
        /// Name awaiting its value
        name: Option<String>,
    },
    Array(Vec<Bson>),
}

/// Writer that assembles a `bson::Document` (or any root value).
#[derive(Debug, Default)]
pub struct BsonDocumentWriter {
    stack: Vec<Open>,
    /// Name under which the innermost open container will be stored
    names: Vec<Option<String>>,
    root: Option<Bson>,
}

impl BsonDocumentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the finished root document.
    pub fn into_document(self) -> MappingResult<Document> {
        match self.into_bson()? {
            Bson::Document(doc) => Ok(doc),
            other => Err(MappingError::malformed(
                "document",
                super::ElementKind::of(&other).as_str(),
            )),
        }
    }

    /// Returns the finished root value.
    pub fn into_bson(self) -> MappingResult<Bson> {
        if !self.stack.is_empty() {
            return Err(MappingError::invalid_state(format!(
                "{} container(s) still open",
                self.stack.len()
            )));
        }
        self.root
            .ok_or_else(|| MappingError::invalid_state("nothing was written"))
    }

    /// Takes the pending name of the enclosing document, if any.
    fn slot(&mut self) -> MappingResult<Option<String>> {
        match self.stack.last_mut() {
            Some(Open::Document { name, .. }) => name
                .take()
                .map(Some)
                .ok_or_else(|| MappingError::invalid_state("value written before its name")),
            Some(Open::Array(_)) => Ok(None),
            None if self.root.is_some() => {
                Err(MappingError::invalid_state("root value already written"))
            }
            None => Ok(None),
        }
    }

    /// Stores a finished value in the enclosing container or as the root.
    fn place(&mut self, name: Option<String>, value: Bson) -> MappingResult<()> {
        match (self.stack.last_mut(), name) {
            (Some(Open::Document { doc, .. }), Some(name)) => {
                doc.insert(name, value);
            }
            (Some(Open::Array(items)), None) => items.push(value),
            (None, None) => self.root = Some(value),
            _ => return Err(MappingError::Internal("writer frame mismatch".into())),
        }
        Ok(())
    }

    fn close(&mut self) -> MappingResult<()> {
        let value = match self.stack.pop() {
            Some(Open::Document { doc, name: None }) => Bson::Document(doc),
            Some(Open::Document { name: Some(name), .. }) => {
                return Err(MappingError::invalid_state(format!(
                    "name '{}' has no value",
                    name
                )))
            }
            Some(Open::Array(items)) => Bson::Array(items),
            None => return Err(MappingError::invalid_state("no open container")),
        };
        let name = self.names.pop().flatten();
        self.place(name, value)
    }
}

impl DocumentWriter for BsonDocumentWriter {
    fn write_start_document(&mut self) -> MappingResult<()> {
        let name = self.slot()?;
        self.names.push(name);
        self.stack.push(Open::Document {
            doc: Document::new(),
            name: None,
        });
        Ok(())
    }

    fn write_end_document(&mut self) -> MappingResult<()> {
        match self.stack.last() {
            Some(Open::Document { .. }) => self.close(),
            _ => Err(MappingError::invalid_state("no open document to end")),
        }
    }

    fn write_start_array(&mut self) -> MappingResult<()> {
        let name = self.slot()?;
        self.names.push(name);
        self.stack.push(Open::Array(Vec::new()));
        Ok(())
    }

    fn write_end_array(&mut self) -> MappingResult<()> {
        match self.stack.last() {
            Some(Open::Array(_)) => self.close(),
            _ => Err(MappingError::invalid_state("no open array to end")),
        }
    }

    fn write_name(&mut self, field: &str) -> MappingResult<()> {
        match self.stack.last_mut() {
            Some(Open::Document { name, .. }) if name.is_none() => {
                *name = Some(field.to_string());
                Ok(())
            }
            Some(Open::Document { .. }) => Err(MappingError::invalid_state(format!(
                "name '{}' written twice without a value",
                field
            ))),
            _ => Err(MappingError::invalid_state("names exist only inside documents")),
        }
    }

    fn write_value(&mut self, value: Bson) -> MappingResult<()> {
        let name = self.slot()?;
        self.place(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_builds_nested_document() {
        let mut writer = BsonDocumentWriter::new();
        writer.write_start_document().unwrap();
        writer.write_name("_id").unwrap();
        writer.write_int32(1).unwrap();
        writer.write_name("tags").unwrap();
        writer.write_start_array().unwrap();
        writer.write_string("a").unwrap();
        writer.write_start_document().unwrap();
        writer.write_name("x").unwrap();
        writer.write_bool(true).unwrap();
        writer.write_end_document().unwrap();
        writer.write_end_array().unwrap();
        writer.write_end_document().unwrap();

        assert_eq!(
            writer.into_document().unwrap(),
            doc! { "_id": 1, "tags": ["a", { "x": true }] }
        );
    }

    #[test]
    fn test_value_without_name_is_rejected() {
        let mut writer = BsonDocumentWriter::new();
        writer.write_start_document().unwrap();
        assert!(matches!(
            writer.write_int32(1),
            Err(MappingError::InvalidState(_))
        ));
    }

    #[test]
    fn test_second_root_is_rejected() {
        let mut writer = BsonDocumentWriter::new();
        writer.write_int64(1).unwrap();
        assert!(writer.write_int64(2).is_err());
        assert_eq!(writer.into_bson().unwrap(), Bson::Int64(1));
    }

    #[test]
    fn test_unclosed_document_is_rejected() {
        let mut writer = BsonDocumentWriter::new();
        writer.write_start_document().unwrap();
        assert!(writer.into_document().is_err());
    }
}
