//! Remote record schema for the record sync strategy.
//!
//! Every catalog item and every captured photo is stored as an individually
//! addressable record inside one per-user zone. Structured fields
//! (glossary, media, references) are JSON-encoded into text fields.

use crate::error::{ProtocolError, ProtocolResult};
use crate::item::{CatalogItem, ItemId};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Record name prefix for catalog item records.
pub const ITEM_RECORD_PREFIX: &str = "item_";
/// Record name prefix for photo records.
pub const PHOTO_RECORD_PREFIX: &str = "photo_";

mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const SUMMARY: &str = "summary";
    pub const EASY_READ: &str = "easyRead";
    pub const DETAIL: &str = "detail";
    pub const GLOSSARY: &str = "glossaryJSON";
    pub const MEDIA: &str = "mediaJSON";
    pub const REFERENCES: &str = "referencesJSON";
    pub const ITEM_ID: &str = "itemId";
    pub const ASSET: &str = "asset";
    pub const FILENAME: &str = "filename";
}

/// A namespaced partition of the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(String);

impl ZoneId {
    /// Creates a zone id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the zone name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a record: zone plus record name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    /// Owning zone.
    pub zone: ZoneId,
    /// Record name, unique within the zone.
    pub name: String,
}

impl RecordId {
    /// Creates a record id.
    pub fn new(zone: ZoneId, name: impl Into<String>) -> Self {
        Self {
            zone,
            name: name.into(),
        }
    }

    /// Returns the id of the catalog record for `item`.
    #[must_use]
    pub fn catalog_item(zone: ZoneId, item: &ItemId) -> Self {
        Self::new(zone, format!("{ITEM_RECORD_PREFIX}{item}"))
    }

    /// Returns the id of the photo record for `item`.
    #[must_use]
    pub fn photo(zone: ZoneId, item: &ItemId) -> Self {
        Self::new(zone, format!("{PHOTO_RECORD_PREFIX}{item}"))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// The two record types stored in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A catalog or user-authored item.
    CatalogItem,
    /// A captured photo with its binary asset.
    Photo,
}

impl RecordKind {
    /// Returns the record type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordKind::CatalogItem => "CatalogItem",
            RecordKind::Photo => "ArtifactPhoto",
        }
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text value.
    Text(String),
    /// Binary attachment stored out of band.
    Asset(Bytes),
}

/// A record as exchanged with the record store.
///
/// `change_tag` is assigned by the store on every save; a save whose tag
/// does not match the stored record is rejected as a concurrent
/// modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record address.
    pub id: RecordId,
    /// Record type.
    pub kind: RecordKind,
    /// Field values by name.
    pub fields: BTreeMap<String, FieldValue>,
    /// Server change tag of the version this record was read from.
    pub change_tag: Option<u64>,
}

impl Record {
    /// Creates an empty, never-saved record.
    #[must_use]
    pub fn new(id: RecordId, kind: RecordKind) -> Self {
        Self {
            id,
            kind,
            fields: BTreeMap::new(),
            change_tag: None,
        }
    }

    /// Sets a text field.
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .insert(name.to_string(), FieldValue::Text(value.into()));
    }

    /// Sets an asset field.
    pub fn set_asset(&mut self, name: &str, data: Bytes) {
        self.fields.insert(name.to_string(), FieldValue::Asset(data));
    }

    /// Returns a text field.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns an asset field.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&Bytes> {
        match self.fields.get(name) {
            Some(FieldValue::Asset(data)) => Some(data),
            _ => None,
        }
    }

    /// Copies every field of `local` onto this record, keeping this
    /// record's identity and change tag.
    ///
    /// Used to replay a rejected write on top of the server's version.
    pub fn reapply_fields(&mut self, local: &Record) {
        for (name, value) in &local.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    fn require_text(&self, name: &'static str) -> ProtocolResult<&str> {
        self.text(name).ok_or_else(|| ProtocolError::MissingField {
            record: self.id.name.clone(),
            field: name,
        })
    }

    fn expect_kind(&self, expected: RecordKind) -> ProtocolResult<()> {
        if self.kind != expected {
            return Err(ProtocolError::WrongKind {
                expected: expected.type_name(),
                found: self.kind.type_name(),
            });
        }
        Ok(())
    }
}

impl CatalogItem {
    /// Encodes this item as a catalog record in `zone`.
    ///
    /// # Errors
    ///
    /// Returns an error if a structured field cannot be JSON-encoded.
    pub fn to_record(&self, zone: ZoneId) -> ProtocolResult<Record> {
        let mut record = Record::new(RecordId::catalog_item(zone, &self.id), RecordKind::CatalogItem);
        record.set_text(fields::ID, self.id.as_str());
        record.set_text(fields::TITLE, &self.title);
        record.set_text(fields::SUMMARY, &self.summary);
        record.set_text(fields::EASY_READ, &self.easy_read);
        record.set_text(fields::DETAIL, &self.detail);
        record.set_text(fields::GLOSSARY, serde_json::to_string(&self.glossary)?);
        record.set_text(fields::MEDIA, serde_json::to_string(&self.media)?);
        record.set_text(fields::REFERENCES, serde_json::to_string(&self.references)?);
        Ok(record)
    }

    /// Decodes a catalog record.
    ///
    /// Missing structured fields decode as empty.
    ///
    /// # Errors
    ///
    /// Returns an error for photo records, records without an id or title,
    /// and malformed JSON fields.
    pub fn from_record(record: &Record) -> ProtocolResult<Self> {
        record.expect_kind(RecordKind::CatalogItem)?;
        let text = |name| record.text(name).unwrap_or_default().to_string();
        let json = |name| record.text(name).filter(|value| !value.is_empty());

        Ok(Self {
            id: ItemId::new(record.require_text(fields::ID)?),
            title: record.require_text(fields::TITLE)?.to_string(),
            summary: text(fields::SUMMARY),
            easy_read: text(fields::EASY_READ),
            detail: text(fields::DETAIL),
            glossary: json(fields::GLOSSARY)
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
            media: json(fields::MEDIA)
                .map(serde_json::from_str)
                .transpose()?
                .flatten(),
            references: json(fields::REFERENCES)
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// A captured photo as stored in the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    /// Item the photo belongs to.
    pub item_id: ItemId,
    /// Local blob filename.
    pub filename: String,
    /// Image bytes.
    pub asset: Bytes,
}

impl PhotoRecord {
    /// Encodes this photo as a record in `zone`.
    #[must_use]
    pub fn to_record(&self, zone: ZoneId) -> Record {
        let mut record = Record::new(RecordId::photo(zone, &self.item_id), RecordKind::Photo);
        record.set_text(fields::ITEM_ID, self.item_id.as_str());
        record.set_text(fields::FILENAME, &self.filename);
        record.set_asset(fields::ASSET, self.asset.clone());
        record
    }

    /// Decodes a photo record.
    ///
    /// # Errors
    ///
    /// Returns an error for catalog records and records missing a field.
    pub fn from_record(record: &Record) -> ProtocolResult<Self> {
        record.expect_kind(RecordKind::Photo)?;
        let asset = record
            .asset(fields::ASSET)
            .cloned()
            .ok_or_else(|| ProtocolError::MissingField {
                record: record.id.name.clone(),
                field: fields::ASSET,
            })?;

        Ok(Self {
            item_id: ItemId::new(record.require_text(fields::ITEM_ID)?),
            filename: record.require_text(fields::FILENAME)?.to_string(),
            asset,
        })
    }
}
