use std::path::Path;

use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("unsupported file type '{file_type}'")]
    UnsupportedFileType { file_type: String },

    #[error("failed to read payload file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file payload with associated metadata, either synthesized from the magic
/// registry or loaded from the filesystem.
#[derive(Clone, Debug)]
pub struct FilePayload {
    pub name: String,
    pub file_type: String,
    pub header: Vec<u8>,
    pub size: u64,
    pub payload: Vec<u8>,
}

// Magic-number registry for synthesized upload payloads. The table is sorted
// by tag and must stay stable across runs: its length feeds the request-count
// oracle.
const MAGIC_REGISTRY: &[(&str, &[u8])] = &[
    ("7z", &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]),
    ("bmp", b"BM"),
    ("doc", &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
    ("elf", &[0x7F, 0x45, 0x4C, 0x46]),
    ("exe", &[0x4D, 0x5A]),
    ("flac", b"fLaC"),
    ("gif", b"GIF89a"),
    ("gz", &[0x1F, 0x8B]),
    ("html", b"<!DOCTYPE html>"),
    ("jpg", &[0xFF, 0xD8, 0xFF, 0xDB]),
    ("mp3", b"ID3"),
    ("ogg", b"OggS"),
    ("pdf", b"%PDF-"),
    ("php", b"<?php"),
    ("png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    ("rar", &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00]),
    ("rtf", b"{\\rtf1"),
    ("wav", b"RIFF"),
    ("xml", b"<?xml "),
    ("zip", &[0x50, 0x4B, 0x03, 0x04]),
];

/// Returns the file types the fuzzer can synthesize, in registry order.
pub fn supported_file_types() -> Vec<&'static str> {
    MAGIC_REGISTRY.iter().map(|(tag, _)| *tag).collect()
}

fn magic_for(file_type: &str) -> Option<&'static [u8]> {
    MAGIC_REGISTRY
        .iter()
        .find(|(tag, _)| *tag == file_type)
        .map(|(_, header)| *header)
}

/// Synthesizes a `size`-byte file of the given type: random fill with the
/// type's magic bytes as a prefix so naive upload filters accept it.
pub fn generate_file(
    file_type: &str,
    size: u64,
    extra_extension: &str,
) -> Result<FilePayload, FileError> {
    let header = magic_for(file_type).ok_or_else(|| FileError::UnsupportedFileType {
        file_type: file_type.to_string(),
    })?;

    let mut payload = vec![0u8; size as usize];
    rand::rng().fill_bytes(&mut payload);
    let prefix = header.len().min(payload.len());
    payload[..prefix].copy_from_slice(&header[..prefix]);

    let mut name = format!("name.{file_type}");
    if !extra_extension.is_empty() {
        name = format!("{name}.{extra_extension}");
    }

    Ok(FilePayload {
        name,
        file_type: file_type.to_string(),
        header: header.to_vec(),
        size,
        payload,
    })
}

/// Loads a payload file from the filesystem. `extra_extension` is appended to
/// the basename so upload filters can be probed with a double extension.
pub fn file_from(path: &Path, extra_extension: &str) -> Result<FilePayload, FileError> {
    let payload = std::fs::read(path).map_err(|source| FileError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let basename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = if extra_extension.is_empty() {
        basename
    } else {
        format!("{basename}.{extra_extension}")
    };
    let file_type = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(FilePayload {
        name,
        file_type,
        header: Vec::new(),
        size: payload.len() as u64,
        payload,
    })
}
