//! Typed records for the booking aggregate and the global rule list.
//!
//! Rows read from the store and records decoded from a document are mapped
//! into these types before any export or import logic touches them.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BookingsHelperError;

pub const PRODUCT_TYPE_TAXONOMY: &str = "product_type";
pub const RESOURCE_BASE_COSTS: &str = "_resource_base_costs";
pub const RESOURCE_BLOCK_COSTS: &str = "_resource_block_costs";
pub const HAS_RESOURCES: &str = "_wc_booking_has_resources";
pub const PUBLISHED: &str = "publish";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PostType {
    Product,
    Resource,
    Person,
}

impl PostType {
    pub fn as_str(self) -> &'static str {
        match self {
            PostType::Product => "product",
            PostType::Resource => "bookable_resource",
            PostType::Person => "bookable_person",
        }
    }
}

/// Category tag carried by a product under the `product_type` taxonomy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductType {
    #[default]
    #[serde(rename = "booking")]
    Booking,
    #[serde(rename = "accommodation-booking")]
    AccommodationBooking,
}

impl ProductType {
    pub const ALL: [ProductType; 2] = [ProductType::Booking, ProductType::AccommodationBooking];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Booking => "booking",
            ProductType::AccommodationBooking => "accommodation-booking",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = BookingsHelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "booking" => Ok(ProductType::Booking),
            "accommodation-booking" => Ok(ProductType::AccommodationBooking),
            other => Err(BookingsHelperError::invalid_input(format!(
                "unknown product type {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub status: String,
    pub product_type: ProductType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub parent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub id: i64,
    pub product_id: i64,
    pub resource_id: i64,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(deserialize_with = "lenient::string")]
    pub meta_key: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub meta_value: String,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            meta_key: key.into(),
            meta_value: value.into(),
        }
    }
}

/// Post row to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub post_type: PostType,
    pub status: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub parent: i64,
}

impl NewPost {
    pub fn published(post_type: PostType, title: impl Into<String>) -> Self {
        Self {
            post_type,
            status: PUBLISHED.to_string(),
            title: title.into(),
            content: String::new(),
            excerpt: String::new(),
            parent: 0,
        }
    }
}

/// A metadata value as seen by the write path.
///
/// `Structured` values are serialized exactly once on write; `Text` values are
/// stored as given.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Structured(Value),
}

impl MetaValue {
    /// Decodes a stored value, turning serialized containers back into structure.
    pub fn probe(raw: &str) -> Self {
        match parse_container(raw) {
            Some(value) => MetaValue::Structured(value),
            None => MetaValue::Text(raw.to_string()),
        }
    }

    pub fn is_serialized(raw: &str) -> bool {
        parse_container(raw).is_some()
    }

    pub fn to_stored(&self) -> String {
        match self {
            MetaValue::Text(text) => text.clone(),
            MetaValue::Structured(value) => value.to_string(),
        }
    }
}

fn parse_container(raw: &str) -> Option<Value> {
    let trimmed = raw.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Reader for PHP `serialize()` output as written by older stores.
mod php {
    use serde_json::{Map, Number, Value};

    /// Decodes arrays, strings, integers, floats, booleans and null. Arrays
    /// become objects keyed by the array key.
    pub(super) fn unserialize(raw: &str) -> Option<Value> {
        let input = raw.trim().as_bytes();
        let mut reader = Reader { input, pos: 0 };
        let value = reader.value()?;
        (reader.pos == input.len()).then_some(value)
    }

    struct Reader<'a> {
        input: &'a [u8],
        pos: usize,
    }

    impl<'a> Reader<'a> {
        fn value(&mut self) -> Option<Value> {
            match self.byte()? {
                b'N' => {
                    self.expect(b';')?;
                    Some(Value::Null)
                }
                b'b' => {
                    self.expect(b':')?;
                    Some(Value::Bool(self.until(b';')? == "1"))
                }
                b'i' => {
                    self.expect(b':')?;
                    self.until(b';')?.parse::<i64>().ok().map(Value::from)
                }
                b'd' => {
                    self.expect(b':')?;
                    let float = self.until(b';')?.parse::<f64>().ok()?;
                    Number::from_f64(float).map(Value::Number)
                }
                b's' => {
                    self.expect(b':')?;
                    let text = self.string()?;
                    self.expect(b';')?;
                    Some(Value::String(text))
                }
                b'a' => {
                    self.expect(b':')?;
                    let len = self.until(b':')?.parse::<usize>().ok()?;
                    self.expect(b'{')?;
                    let mut map = Map::new();
                    for _ in 0..len {
                        let key = match self.value()? {
                            Value::String(key) => key,
                            Value::Number(key) => key.to_string(),
                            _ => return None,
                        };
                        let value = self.value()?;
                        map.insert(key, value);
                    }
                    self.expect(b'}')?;
                    Some(Value::Object(map))
                }
                _ => None,
            }
        }

        /// `<len>:"<bytes>"`, length counted in bytes.
        fn string(&mut self) -> Option<String> {
            let len = self.until(b':')?.parse::<usize>().ok()?;
            self.expect(b'"')?;
            let end = self.pos.checked_add(len)?;
            let bytes = self.input.get(self.pos..end)?;
            self.pos = end;
            self.expect(b'"')?;
            String::from_utf8(bytes.to_vec()).ok()
        }

        fn byte(&mut self) -> Option<u8> {
            let byte = *self.input.get(self.pos)?;
            self.pos += 1;
            Some(byte)
        }

        fn expect(&mut self, want: u8) -> Option<()> {
            (self.byte()? == want).then_some(())
        }

        fn until(&mut self, end: u8) -> Option<&'a str> {
            let rest = self.input.get(self.pos..)?;
            let len = rest.iter().position(|b| *b == end)?;
            self.pos += len + 1;
            std::str::from_utf8(&rest[..len]).ok()
        }
    }
}

/// Resource-id keyed cost map stored under `_resource_base_costs` / `_resource_block_costs`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostDictionary {
    entries: BTreeMap<i64, Value>,
}

impl CostDictionary {
    /// Parses a stored dictionary. Anything that is not an object, and keys that
    /// are not resource ids, yield no entries.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_default()
    }

    /// Parses a JSON object or a PHP-serialized array. `None` when `raw` is
    /// neither.
    pub fn try_parse(raw: &str) -> Option<Self> {
        let map = match parse_container(raw).or_else(|| php::unserialize(raw))? {
            Value::Object(map) => map,
            _ => return None,
        };
        let entries = map
            .into_iter()
            .filter_map(|(key, value)| key.trim().parse::<i64>().ok().map(|id| (id, value)))
            .collect();
        Some(Self { entries })
    }

    pub fn get(&self, resource_id: i64) -> Option<&Value> {
        self.entries.get(&resource_id)
    }

    /// Value for `resource_id`, or an empty string when the entry is absent.
    pub fn cost_or_empty(&self, resource_id: i64) -> Value {
        match self.entries.get(&resource_id) {
            Some(Value::Null) | None => Value::String(String::new()),
            Some(value) => value.clone(),
        }
    }

    pub fn insert(&mut self, resource_id: i64, value: Value) {
        self.entries.insert(resource_id, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    pub fn to_value(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect::<serde_json::Map<String, Value>>();
        Value::Object(map)
    }

    pub fn to_meta_value(&self) -> MetaValue {
        MetaValue::Structured(self.to_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRule {
    #[serde(
        rename = "ID",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_i64"
    )]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub gcal_event_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub range_type: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub from_date: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub to_date: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub from_range: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub to_range: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub bookable: String,
    #[serde(default = "default_priority", deserialize_with = "lenient::i64")]
    pub priority: i64,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub ordering: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date_created: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date_modified: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub rrule: Option<String>,
}

fn default_priority() -> i64 {
    10
}

/// Deserializers accepting the loosely typed scalars found in exported documents,
/// where every column may arrive as a string.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer, de::Error};
    use serde_json::Value;

    pub fn value_to_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) if s.trim().is_empty() => Some(0),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn value_to_string(value: Value) -> String {
        match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_i64(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, found {value}")))
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        value_to_i64(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, found {value}")))
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(value_to_string(Value::deserialize(deserializer)?))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(value_to_string(value)))
        }
    }
}
