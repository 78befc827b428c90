//! Packaging of exported documents into downloadable files, and the reverse
//! when reading an uploaded file back.
//!
//! With the `archive` feature, exports are zip containers holding one JSON
//! document (two for a batch carrying rules). Without it the JSON bytes are
//! written directly.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use rand::{Rng, distributions::Alphanumeric};

use crate::{errors::BookingsHelperError, import::check_size};

pub const PRODUCTS_ENTRY: &str = "booking-products";
pub const RULES_ENTRY: &str = "global-availability-rules";
pub const MULTIPLE_FILES: &str = "More than one file exists in the zip file";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Whether this build can write and read zip containers.
pub fn archive_available() -> bool {
    cfg!(feature = "archive")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PackagedFile {
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, BookingsHelperError> {
        fs::create_dir_all(dir).map_err(|e| BookingsHelperError::io(e.to_string()))?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes).map_err(|e| BookingsHelperError::io(e.to_string()))?;
        Ok(path)
    }
}

/// Payload found inside an uploaded file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerContents {
    Document(Vec<u8>),
    ProductsWithRules { products: Vec<u8>, rules: Vec<u8> },
}

pub fn product_stem(id: i64, date: NaiveDate) -> String {
    format!("booking-product-{id}-{}", date.format("%Y-%m-%d"))
}

pub fn rules_stem<R: Rng>(date: NaiveDate, rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("booking-global-rules-{}-{suffix}", date.format("%Y-%m-%d"))
}

pub fn batch_stem(with_rules: bool, date: NaiveDate, timestamp: i64) -> String {
    let kind = if with_rules {
        "booking-products-with-global-availability-rules"
    } else {
        "booking-products"
    };
    format!("{kind}-{}-{timestamp}", date.format("%Y-%m-%d"))
}

/// One document, zipped when archives are available.
pub fn pack_document(stem: &str, json: Vec<u8>) -> Result<PackagedFile, BookingsHelperError> {
    if !archive_available() {
        return Ok(PackagedFile {
            file_name: format!("{stem}.json"),
            bytes: json,
        });
    }
    Ok(PackagedFile {
        file_name: format!("{stem}.zip"),
        bytes: archive::write(&[(format!("{stem}.json"), json.as_slice())])?,
    })
}

/// Batch products plus rules as a two-entry container.
pub fn pack_products_with_rules(
    stem: &str,
    products: &[u8],
    rules: &[u8],
) -> Result<PackagedFile, BookingsHelperError> {
    if !archive_available() {
        return Err(BookingsHelperError::container(
            "zip support is not available in this build",
        ));
    }
    Ok(PackagedFile {
        file_name: format!("{stem}.zip"),
        bytes: archive::write(&[
            (format!("{PRODUCTS_ENTRY}.json"), products),
            (format!("{RULES_ENTRY}.json"), rules),
        ])?,
    })
}

/// Reads a file from disk, refusing anything larger than `max_bytes`.
pub fn read_limited(path: &Path, max_bytes: u64) -> Result<Vec<u8>, BookingsHelperError> {
    let metadata = fs::metadata(path).map_err(|e| {
        BookingsHelperError::invalid_input(format!("cannot read {}: {e}", path.display()))
    })?;
    if metadata.len() > max_bytes {
        return Err(BookingsHelperError::size_exceeded(crate::import::SIZE_EXCEEDED));
    }
    fs::read(path).map_err(|e| BookingsHelperError::io(e.to_string()))
}

/// Unwraps an uploaded file: zip containers are opened, anything else is
/// returned as a raw document.
pub fn open_container(
    bytes: Vec<u8>,
    max_bytes: u64,
) -> Result<ContainerContents, BookingsHelperError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Ok(ContainerContents::Document(bytes));
    }
    if !archive_available() {
        return Err(BookingsHelperError::container(
            "zip support is not available in this build",
        ));
    }
    let mut entries = archive::read_payloads(bytes, max_bytes)?;
    match entries.len() {
        0 => Err(BookingsHelperError::container("The zip file contains no files")),
        1 => Ok(ContainerContents::Document(entries.remove(0).1)),
        2 => {
            let stems: Vec<&str> = entries.iter().map(|(name, _)| entry_stem(name)).collect();
            let products = stems.iter().position(|s| *s == PRODUCTS_ENTRY);
            let rules = stems.iter().position(|s| *s == RULES_ENTRY);
            match (products, rules) {
                (Some(p), Some(r)) => {
                    let rules = entries[r].1.clone();
                    let products = entries.swap_remove(p).1;
                    Ok(ContainerContents::ProductsWithRules { products, rules })
                }
                _ => Err(BookingsHelperError::container(MULTIPLE_FILES)),
            }
        }
        _ => Err(BookingsHelperError::container(MULTIPLE_FILES)),
    }
}

/// `dir/booking-products.json` -> `booking-products`
fn entry_stem(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base)
}

fn is_hidden_entry(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || name
            .split('/')
            .any(|segment| segment.starts_with('.') && segment.len() > 1)
}

#[cfg(feature = "archive")]
mod archive {
    use std::io::{Cursor, Read, Write};

    use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

    use super::{check_size, is_hidden_entry};
    use crate::errors::BookingsHelperError;

    pub(super) fn write(entries: &[(String, &[u8])]) -> Result<Vec<u8>, BookingsHelperError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, bytes) in entries {
                writer
                    .start_file(name.as_str(), options)
                    .map_err(|e| BookingsHelperError::container(e.to_string()))?;
                writer
                    .write_all(bytes)
                    .map_err(|e| BookingsHelperError::io(e.to_string()))?;
            }
            writer
                .finish()
                .map_err(|e| BookingsHelperError::container(e.to_string()))?;
        }
        Ok(cursor.into_inner())
    }

    pub(super) fn read_payloads(
        bytes: Vec<u8>,
        max_bytes: u64,
    ) -> Result<Vec<(String, Vec<u8>)>, BookingsHelperError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| BookingsHelperError::container(format!("Cannot open the zip file: {e}")))?;
        let mut payloads = Vec::new();
        for idx in 0..archive.len() {
            let mut file = archive
                .by_index(idx)
                .map_err(|e| BookingsHelperError::container(e.to_string()))?;
            let name = file.name().to_string();
            if file.is_dir() || is_hidden_entry(&name) {
                continue;
            }
            check_size(file.size() as usize, max_bytes)?;
            let mut buffer = Vec::new();
            (&mut file)
                .take(max_bytes.saturating_add(1))
                .read_to_end(&mut buffer)
                .map_err(|e| BookingsHelperError::container(format!("Cannot read {name}: {e}")))?;
            check_size(buffer.len(), max_bytes)?;
            payloads.push((name, buffer));
        }
        Ok(payloads)
    }
}

#[cfg(not(feature = "archive"))]
mod archive {
    use crate::errors::BookingsHelperError;

    pub(super) fn write(_entries: &[(String, &[u8])]) -> Result<Vec<u8>, BookingsHelperError> {
        Err(BookingsHelperError::container(
            "zip support is not available in this build",
        ))
    }

    pub(super) fn read_payloads(
        _bytes: Vec<u8>,
        _max_bytes: u64,
    ) -> Result<Vec<(String, Vec<u8>)>, BookingsHelperError> {
        Err(BookingsHelperError::container(
            "zip support is not available in this build",
        ))
    }
}
