//! Built-in scalar and collection codecs

use std::sync::Arc;

use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use super::context::{DecodeContext, EncodeContext};
use super::Codec;
use crate::document::{DocumentReader, DocumentWriter, ElementKind};
use crate::errors::{MappingError, MappingResult};
use crate::model::{Value, ValueType};
use crate::options::{DateStorage, UuidRepresentation};

/// Codec for every scalar value type
pub struct ScalarCodec {
    value_type: ValueType,
}

impl ScalarCodec {
    pub fn new(value_type: ValueType) -> Self {
        Self { value_type }
    }
}

impl Codec for ScalarCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        let options = ctx.codecs().options();
        let bson = match value {
            Value::Uuid(uuid) => Bson::Binary(uuid_to_binary(uuid, options.uuid_representation)),
            Value::LocalDateTime(local) => {
                Bson::DateTime(local_to_instant(local, options.date_storage)?)
            }
            other => other
                .to_bson_scalar()
                .ok_or_else(|| MappingError::malformed("scalar", other.kind_name()))?,
        };
        writer.write_value(bson)
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        let kind = reader.peek_kind();
        if kind == ElementKind::Null {
            reader.read_null()?;
            return Ok(Value::Null);
        }
        match &self.value_type {
            ValueType::Bool => reader.read_bool().map(Value::Bool),
            ValueType::Int32 => reader.read_int32().map(Value::Int32),
            ValueType::Int64 => match kind {
                ElementKind::Int32 => reader.read_int32().map(|v| Value::Int64(v as i64)),
                _ => reader.read_int64().map(Value::Int64),
            },
            ValueType::Double => match kind {
                ElementKind::Int32 => reader.read_int32().map(|v| Value::Double(v as f64)),
                ElementKind::Int64 => reader.read_int64().map(|v| Value::Double(v as f64)),
                _ => reader.read_double().map(Value::Double),
            },
            ValueType::String => reader.read_string().map(Value::String),
            ValueType::ObjectId => reader.read_object_id().map(Value::ObjectId),
            ValueType::DateTime => reader.read_date_time().map(Value::DateTime),
            ValueType::LocalDateTime => {
                let instant = reader.read_date_time()?;
                instant_to_local(instant, ctx.codecs().options().date_storage)
                    .map(Value::LocalDateTime)
            }
            ValueType::Uuid => {
                let (subtype, bytes) = reader.read_binary()?;
                uuid_from_binary(subtype, &bytes, ctx.codecs().options().uuid_representation)
                    .map(Value::Uuid)
            }
            other => Err(MappingError::Internal(format!(
                "no scalar codec for {:?}",
                other
            ))),
        }
    }
}

/// Swaps between RFC 4122 byte order and a legacy layout. Every swap is its
/// own inverse.
fn swap_legacy_order(bytes: &mut [u8; 16], representation: UuidRepresentation) {
    match representation {
        UuidRepresentation::JavaLegacy => {
            bytes[..8].reverse();
            bytes[8..].reverse();
        }
        UuidRepresentation::CSharpLegacy => {
            bytes[..4].reverse();
            bytes[4..6].reverse();
            bytes[6..8].reverse();
        }
        UuidRepresentation::Standard | UuidRepresentation::PythonLegacy => {}
    }
}

pub(crate) fn uuid_to_binary(uuid: &Uuid, representation: UuidRepresentation) -> Binary {
    let mut bytes = *uuid.as_bytes();
    let subtype = match representation {
        UuidRepresentation::Standard => BinarySubtype::Uuid,
        _ => BinarySubtype::UuidOld,
    };
    swap_legacy_order(&mut bytes, representation);
    Binary {
        subtype,
        bytes: bytes.to_vec(),
    }
}

/// Subtype 4 is always standard order; subtype 3 is read in the configured
/// legacy layout.
pub(crate) fn uuid_from_binary(
    subtype: BinarySubtype,
    bytes: &[u8],
    representation: UuidRepresentation,
) -> MappingResult<Uuid> {
    let mut raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| MappingError::malformed("uuid", "binary of wrong length"))?;
    match subtype {
        BinarySubtype::Uuid => {}
        BinarySubtype::UuidOld => swap_legacy_order(&mut raw, representation),
        _ => return Err(MappingError::malformed("uuid", "binary")),
    }
    Ok(Uuid::from_bytes(raw))
}

fn local_to_instant(local: &NaiveDateTime, storage: DateStorage) -> MappingResult<bson::DateTime> {
    let millis = match storage {
        DateStorage::Utc => Utc.from_utc_datetime(local).timestamp_millis(),
        DateStorage::SystemDefault => Local
            .from_local_datetime(local)
            .earliest()
            .ok_or_else(|| MappingError::malformed("local date-time", "time skipped by the zone"))?
            .timestamp_millis(),
    };
    Ok(bson::DateTime::from_millis(millis))
}

fn instant_to_local(instant: bson::DateTime, storage: DateStorage) -> MappingResult<NaiveDateTime> {
    let utc = Utc
        .timestamp_millis_opt(instant.timestamp_millis())
        .single()
        .ok_or_else(|| MappingError::malformed("date", "out-of-range date"))?;
    Ok(match storage {
        DateStorage::Utc => utc.naive_utc(),
        DateStorage::SystemDefault => utc.with_timezone(&Local).naive_local(),
    })
}

/// Writes null for absent values, delegates otherwise
pub struct OptionalCodec {
    inner: Arc<dyn Codec>,
}

impl OptionalCodec {
    pub fn new(inner: Arc<dyn Codec>) -> Self {
        Self { inner }
    }
}

impl Codec for OptionalCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        match value {
            Value::Null => writer.write_null(),
            other => self.inner.encode(other, writer, ctx),
        }
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        if reader.peek_kind() == ElementKind::Null {
            reader.read_null()?;
            return Ok(Value::Null);
        }
        self.inner.decode(reader, ctx)
    }
}

/// Lists as arrays
pub struct ListCodec {
    element: Arc<dyn Codec>,
}

impl ListCodec {
    pub fn new(element: Arc<dyn Codec>) -> Self {
        Self { element }
    }
}

impl Codec for ListCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        let Value::List(items) = value else {
            return Err(MappingError::malformed("list", value.kind_name()));
        };
        writer.write_start_array()?;
        for item in items {
            self.element.encode(item, writer, ctx)?;
        }
        writer.write_end_array()
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        let mut items = Vec::new();
        reader.read_start_array()?;
        while reader.peek_kind() != ElementKind::EndOfArray {
            items.push(self.element.decode(reader, ctx)?);
        }
        reader.read_end_array()?;
        Ok(Value::List(items))
    }
}

/// String-keyed maps as sub-documents
pub struct MapCodec {
    value: Arc<dyn Codec>,
}

impl MapCodec {
    pub fn new(value: Arc<dyn Codec>) -> Self {
        Self { value }
    }
}

impl Codec for MapCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        let Value::Map(entries) = value else {
            return Err(MappingError::malformed("map", value.kind_name()));
        };
        writer.write_start_document()?;
        for (key, entry) in entries {
            writer.write_name(key)?;
            self.value.encode(entry, writer, ctx)?;
        }
        writer.write_end_document()
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        let mut entries = Vec::new();
        reader.read_start_document()?;
        while reader.peek_kind() != ElementKind::EndOfDocument {
            let key = reader.read_name()?;
            entries.push((key, self.value.decode(reader, ctx)?));
        }
        reader.read_end_document()?;
        Ok(Value::Map(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Uuid {
        Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap()
    }

    #[test]
    fn test_uuid_layouts() {
        let standard = uuid_to_binary(&sample(), UuidRepresentation::Standard);
        assert_eq!(standard.subtype, BinarySubtype::Uuid);
        assert_eq!(standard.bytes, sample().as_bytes().to_vec());

        let java = uuid_to_binary(&sample(), UuidRepresentation::JavaLegacy);
        assert_eq!(java.subtype, BinarySubtype::UuidOld);
        assert_eq!(
            java.bytes,
            vec![
                0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00, 0xff, 0xee, 0xdd, 0xcc, 0xbb,
                0xaa, 0x99, 0x88
            ]
        );

        let csharp = uuid_to_binary(&sample(), UuidRepresentation::CSharpLegacy);
        assert_eq!(&csharp.bytes[..8], &[0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66]);
        assert_eq!(&csharp.bytes[8..], &sample().as_bytes()[8..]);
    }

    #[test]
    fn test_uuid_read_back_in_each_layout() {
        for representation in [
            UuidRepresentation::Standard,
            UuidRepresentation::JavaLegacy,
            UuidRepresentation::CSharpLegacy,
            UuidRepresentation::PythonLegacy,
        ] {
            let binary = uuid_to_binary(&sample(), representation);
            let back = uuid_from_binary(binary.subtype, &binary.bytes, representation).unwrap();
            assert_eq!(back, sample());
        }
    }

    #[test]
    fn test_uuid_rejects_other_binary() {
        assert!(uuid_from_binary(BinarySubtype::Generic, &[0; 16], UuidRepresentation::Standard)
            .is_err());
        assert!(uuid_from_binary(BinarySubtype::Uuid, &[0; 4], UuidRepresentation::Standard)
            .is_err());
    }

    #[test]
    fn test_local_date_time_in_utc() {
        let local = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_milli_opt(12, 30, 0, 250))
            .unwrap();
        let instant = local_to_instant(&local, DateStorage::Utc).unwrap();
        assert_eq!(instant.timestamp_millis(), 1_705_321_800_250);
        assert_eq!(instant_to_local(instant, DateStorage::Utc).unwrap(), local);
    }

    #[test]
    fn test_local_date_time_in_system_zone() {
        let local = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let instant = local_to_instant(&local, DateStorage::SystemDefault).unwrap();
        assert_eq!(
            instant_to_local(instant, DateStorage::SystemDefault).unwrap(),
            local
        );
    }
}
