//! JSON codec for export documents, batch envelopes and rule lists.
//!
//! Encoded product and batch documents carry a `format` discriminant. Decoding
//! still accepts the shapes written before the discriminant existed:
//! a bare `{"product": ..}` object, the `{"booking-products": {..}}` envelope,
//! and a bare object keyed by product id.

use std::io::Write;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    document::{BatchDocument, ExportDocument},
    errors::BookingsHelperError,
    model::GlobalRule,
};

pub const FORMAT_KEY: &str = "format";
pub const PRODUCT_FORMAT: &str = "bookings-helper/product";
pub const BATCH_FORMAT: &str = "bookings-helper/batch";
pub const PRODUCT_KEY: &str = "product";
pub const BATCH_PRODUCTS_KEY: &str = "booking-products";
pub const BATCH_RULES_KEY: &str = "global-availability-rules";
pub const LEGACY_RULES_KEY: &str = "global_rules";

/// Structural shape of a decoded top-level object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentShape {
    Product,
    Batch,
    /// `{ "<product id>": <product document>, .. }`
    IdKeyedBatch,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    format: &'static str,
    #[serde(flatten)]
    inner: &'a T,
}

pub fn encode_document(doc: &ExportDocument) -> Result<Vec<u8>, BookingsHelperError> {
    serde_json::to_vec(&Tagged {
        format: PRODUCT_FORMAT,
        inner: doc,
    })
    .map_err(|e| BookingsHelperError::invalid_input(e.to_string()))
}

pub fn encode_batch(batch: &BatchDocument) -> Result<Vec<u8>, BookingsHelperError> {
    let mut writer = BatchWriter::new(Vec::new())?;
    for (id, doc) in &batch.products {
        writer.push(*id, doc)?;
    }
    writer.finish(batch.rules.as_deref())
}

pub fn encode_rules(rules: &[GlobalRule]) -> Result<Vec<u8>, BookingsHelperError> {
    serde_json::to_vec(rules).map_err(|e| BookingsHelperError::invalid_input(e.to_string()))
}

/// Writes a batch envelope one aggregate at a time, so a batch export never
/// holds more than one typed document in memory.
pub struct BatchWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> BatchWriter<W> {
    pub fn new(mut writer: W) -> Result<Self, BookingsHelperError> {
        write!(
            writer,
            "{{\"{FORMAT_KEY}\":\"{BATCH_FORMAT}\",\"{BATCH_PRODUCTS_KEY}\":{{"
        )
        .map_err(|e| BookingsHelperError::io(e.to_string()))?;
        Ok(Self { writer, written: 0 })
    }

    pub fn push(&mut self, id: i64, doc: &ExportDocument) -> Result<(), BookingsHelperError> {
        if self.written > 0 {
            self.writer
                .write_all(b",")
                .map_err(|e| BookingsHelperError::io(e.to_string()))?;
        }
        write!(self.writer, "\"{id}\":").map_err(|e| BookingsHelperError::io(e.to_string()))?;
        serde_json::to_writer(&mut self.writer, doc)
            .map_err(|e| BookingsHelperError::invalid_input(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn finish(mut self, rules: Option<&[GlobalRule]>) -> Result<W, BookingsHelperError> {
        self.writer
            .write_all(b"}")
            .map_err(|e| BookingsHelperError::io(e.to_string()))?;
        if let Some(rules) = rules {
            write!(self.writer, ",\"{BATCH_RULES_KEY}\":")
                .map_err(|e| BookingsHelperError::io(e.to_string()))?;
            serde_json::to_writer(&mut self.writer, rules)
                .map_err(|e| BookingsHelperError::invalid_input(e.to_string()))?;
        }
        self.writer
            .write_all(b"}")
            .map_err(|e| BookingsHelperError::io(e.to_string()))?;
        Ok(self.writer)
    }
}

/// Parses `bytes` into a top-level JSON object.
pub fn decode(bytes: &[u8]) -> Result<Map<String, Value>, BookingsHelperError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        BookingsHelperError::malformed(format!("The file is not in a valid JSON format: {e}"))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BookingsHelperError::malformed(format!(
            "expected a JSON object at the top level, found {}",
            json_kind(&other)
        ))),
    }
}

pub fn detect_shape(map: &Map<String, Value>) -> Result<DocumentShape, BookingsHelperError> {
    if let Some(format) = map.get(FORMAT_KEY) {
        return match format.as_str() {
            Some(PRODUCT_FORMAT) => Ok(DocumentShape::Product),
            Some(BATCH_FORMAT) => Ok(DocumentShape::Batch),
            _ => Err(BookingsHelperError::malformed(format!(
                "unsupported document format {format}"
            ))),
        };
    }
    if map.contains_key(PRODUCT_KEY) {
        return Ok(DocumentShape::Product);
    }
    if map.contains_key(BATCH_PRODUCTS_KEY) {
        return Ok(DocumentShape::Batch);
    }
    let id_keyed = !map.is_empty()
        && map
            .iter()
            .all(|(key, value)| key.trim().parse::<i64>().is_ok() && value.is_object());
    if id_keyed {
        return Ok(DocumentShape::IdKeyedBatch);
    }
    Err(BookingsHelperError::malformed(
        "document has no product key and is not a batch of products",
    ))
}

pub fn document_from_map(map: Map<String, Value>) -> Result<ExportDocument, BookingsHelperError> {
    if !map.contains_key(PRODUCT_KEY) {
        return Err(BookingsHelperError::malformed(
            "document is missing the product key",
        ));
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|e| BookingsHelperError::malformed(format!("invalid product document: {e}")))
}

pub fn decode_document(bytes: &[u8]) -> Result<ExportDocument, BookingsHelperError> {
    document_from_map(decode(bytes)?)
}

/// Entries of a batch-shaped object, in key order, each still undecoded.
pub fn batch_entries(
    mut map: Map<String, Value>,
    shape: DocumentShape,
) -> Result<Vec<(String, Value)>, BookingsHelperError> {
    match shape {
        DocumentShape::IdKeyedBatch => Ok(map.into_iter().collect()),
        DocumentShape::Batch => match map.remove(BATCH_PRODUCTS_KEY) {
            Some(Value::Object(products)) => Ok(products.into_iter().collect()),
            Some(Value::Array(products)) => Ok(products
                .into_iter()
                .enumerate()
                .map(|(idx, value)| (idx.to_string(), value))
                .collect()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(BookingsHelperError::malformed(format!(
                "{BATCH_PRODUCTS_KEY} must be an object, found {}",
                json_kind(&other)
            ))),
        },
        DocumentShape::Product => Err(BookingsHelperError::malformed(
            "a single product document has no batch entries",
        )),
    }
}

/// Rule list embedded next to products, if any. An empty list counts as absent.
pub fn embedded_rules(
    map: &Map<String, Value>,
) -> Result<Option<Vec<GlobalRule>>, BookingsHelperError> {
    let payload = map
        .get(BATCH_RULES_KEY)
        .or_else(|| map.get(LEGACY_RULES_KEY))
        .filter(|value| !value.is_null());
    let rules = match payload {
        None => return Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(None),
        Some(Value::String(text)) => decode_rules(text.as_bytes())?,
        Some(value) => rules_from_value(value.clone())?,
    };
    Ok(non_empty(rules))
}

/// Decodes a standalone rule payload, `None` when it is blank or holds no rules.
pub fn decode_rule_payload(
    bytes: &[u8],
) -> Result<Option<Vec<GlobalRule>>, BookingsHelperError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    decode_rules(bytes).map(non_empty)
}

fn non_empty(rules: Vec<GlobalRule>) -> Option<Vec<GlobalRule>> {
    if rules.is_empty() { None } else { Some(rules) }
}

pub fn decode_rules(bytes: &[u8]) -> Result<Vec<GlobalRule>, BookingsHelperError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        BookingsHelperError::malformed(format!("The file is not in a valid JSON format: {e}"))
    })?;
    rules_from_value(value)
}

pub fn rules_from_value(value: Value) -> Result<Vec<GlobalRule>, BookingsHelperError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, rule)| rule).collect(),
        other => {
            return Err(BookingsHelperError::malformed(format!(
                "expected a list of rules, found {}",
                json_kind(&other)
            )));
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value(item)
                .map_err(|e| BookingsHelperError::malformed(format!("rule {idx}: {e}")))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
