use crate::error::Error;
use crate::stream::binary_reader::BinaryReader;
use crate::stream::xml_reader::XmlReader;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Plist {
    Array(Vec<Plist>),
    Dictionary(IndexMap<String, Plist>),
    Boolean(bool),
    Integer(i128),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    /// Keyed-archiver object reference; only binary plists carry these.
    Uid(u64),
}

impl Plist {
    /// Decodes a binary (`bplist00`) or XML property list.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.starts_with(b"bplist") {
            BinaryReader::parse(data)
        } else {
            XmlReader::parse(data)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Plist::Array(_) => "array",
            Plist::Dictionary(_) => "dictionary",
            Plist::Boolean(_) => "boolean",
            Plist::Integer(_) => "integer",
            Plist::Float(_) => "real",
            Plist::String(_) => "string",
            Plist::Date(_) => "date",
            Plist::Data(_) => "data",
            Plist::Uid(_) => "uid",
        }
    }

    pub fn as_dictionary(&self) -> Option<&IndexMap<String, Plist>> {
        match self {
            Plist::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Plist]> {
        match self {
            Plist::Array(list) => Some(list),
            _ => None,
        }
    }
}

impl From<bool> for Plist {
    fn from(value: bool) -> Self {
        Plist::Boolean(value)
    }
}
impl From<i64> for Plist {
    fn from(value: i64) -> Self {
        Plist::Integer(value.into())
    }
}
impl From<f64> for Plist {
    fn from(value: f64) -> Self {
        Plist::Float(value)
    }
}
impl From<&str> for Plist {
    fn from(value: &str) -> Self {
        Plist::String(value.to_string())
    }
}
impl From<String> for Plist {
    fn from(value: String) -> Self {
        Plist::String(value)
    }
}
impl From<Vec<Plist>> for Plist {
    fn from(value: Vec<Plist>) -> Self {
        Plist::Array(value)
    }
}
impl From<IndexMap<String, Plist>> for Plist {
    fn from(value: IndexMap<String, Plist>) -> Self {
        Plist::Dictionary(value)
    }
}
impl From<DateTime<Utc>> for Plist {
    fn from(value: DateTime<Utc>) -> Self {
        Plist::Date(value)
    }
}
