// wg-gen-web client name lookup

//! Peer name resolution
//!
//! wg-gen-web keeps one JSON file per client, named after a UUID, holding at
//! least the client's `publicKey` and `name`. This module links a peer's
//! public key to that name.

use crate::types::UNKNOWN_NAME;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum number of names kept in the lookup cache
pub const NAME_CACHE_CAPACITY: usize = 256;

/// Fields read from a wg-gen-web client file
#[derive(Debug, Deserialize)]
struct ClientFile {
    #[serde(rename = "publicKey")]
    public_key: String,
    name: String,
}

/// Directory of wg-gen-web client files with a bounded name cache
///
/// Only found names are cached, so a client file created later is still
/// picked up on the next lookup.
#[derive(Debug)]
pub struct NameDirectory {
    path: PathBuf,
    cache: HashMap<String, String>,
    capacity: usize,
}

impl NameDirectory {
    /// Create a lookup over `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, NAME_CACHE_CAPACITY)
    }

    /// Create a lookup whose cache holds at most `capacity` names
    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            cache: HashMap::new(),
            capacity,
        }
    }

    /// Directory being scanned
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of cached names
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Name of the client owning `public_key`, or [`UNKNOWN_NAME`]
    pub fn resolve(&mut self, public_key: &str) -> String {
        if let Some(name) = self.cache.get(public_key) {
            return name.clone();
        }

        match find_name(&self.path, public_key) {
            Some(name) => {
                if self.capacity == 0 {
                    return name;
                }
                if self.cache.len() >= self.capacity {
                    log::debug!("Name cache full ({} entries), clearing", self.cache.len());
                    self.cache.clear();
                }
                self.cache.insert(public_key.to_string(), name.clone());
                name
            }
            None => UNKNOWN_NAME.to_string(),
        }
    }
}

/// Whether a file name looks like a wg-gen-web client file (`*-*-*-*-*`)
pub fn is_client_file_name(file_name: &str) -> bool {
    !file_name.starts_with('.') && file_name.matches('-').count() >= 4
}

/// Scan `dir` for the client file holding `public_key`
///
/// An unreadable directory yields `None`; unreadable or malformed files are
/// skipped.
pub fn find_name(dir: &Path, public_key: &str) -> Option<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read wg-gen-web directory {:?}: {}", dir, e);
            return None;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_client_file_name(&entry.file_name().to_string_lossy()) {
            continue;
        }

        match read_client_file(&path) {
            Ok(client) if client.public_key == public_key => return Some(client.name),
            Ok(_) => {}
            Err(e) => log::debug!("Skipping {:?}: {:#}", path, e),
        }
    }

    None
}

fn read_client_file(path: &Path) -> Result<ClientFile> {
    let contents = fs::read_to_string(path).context("Failed to read client file")?;
    serde_json::from_str(&contents).context("Failed to parse client file")
}
