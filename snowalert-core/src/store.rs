//! Durable alert document and the persistence primitive behind it.
//!
//! The whole document is rewritten on every flush. The JSON file backend
//! writes a sibling temp file and renames it over the target so readers
//! never see a half-written document.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    fs,
    path::PathBuf,
};
use tracing::{debug, info};

use crate::{
    error::StoreError,
    model::{AlertName, AlertRecord, ChatId, Coordinates, LocationKey},
};

/// chat → location → alert names, in check-time order.
pub type Associations = BTreeMap<ChatId, BTreeMap<LocationKey, Vec<AlertName>>>;

const DOCUMENT_VERSION: u8 = 1;

fn default_document_version() -> u8 {
    DOCUMENT_VERSION
}

/// Everything that has to survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "default_document_version")]
    pub version: u8,
    /// Every resolved `[lat, lon]` pair, in first-seen order.
    #[serde(default)]
    pub cities: Vec<[f64; 2]>,
    #[serde(default)]
    pub chats: Associations,
    #[serde(default)]
    pub alerts: BTreeMap<AlertName, AlertRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            cities: Vec::new(),
            chats: BTreeMap::new(),
            alerts: BTreeMap::new(),
        }
    }
}

impl Document {
    pub fn city_coordinates(&self) -> impl Iterator<Item = Coordinates> + '_ {
        self.cities.iter().map(|[lat, lon]| Coordinates::new(*lat, *lon))
    }

    pub fn has_city(&self, key: &LocationKey) -> bool {
        self.city_coordinates().any(|c| &c.key() == key)
    }
}

/// Load/save primitive for the document.
pub trait Persistence: Send + Sync + Debug {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Document>, StoreError>;

    /// Replace the stored document as a whole.
    fn save(&self, document: &Document) -> Result<(), StoreError>;
}

/// Document stored as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write { path: self.path.clone(), source }
    }
}

impl Persistence for JsonFileStore {
    fn load(&self) -> Result<Option<Document>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read { path: self.path.clone(), source });
            }
        };

        let document = serde_json::from_slice(&bytes).map_err(StoreError::Decode)?;
        debug!(path = %self.path.display(), "loaded alert document");
        Ok(Some(document))
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
            }
        }

        let json = serde_json::to_vec_pretty(document).map_err(StoreError::Encode)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json).map_err(|e| self.write_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.write_error(e))?;
        Ok(())
    }
}

/// In-memory copy of the document plus the backend it is flushed to.
#[derive(Debug)]
pub struct DurableStore {
    document: Document,
    backend: Box<dyn Persistence>,
}

impl DurableStore {
    /// Load the stored document, creating and writing the default one when
    /// nothing is stored yet.
    pub fn open(backend: Box<dyn Persistence>) -> Result<Self, StoreError> {
        match backend.load()? {
            Some(document) => Ok(Self { document, backend }),
            None => {
                let store = Self { document: Document::default(), backend };
                store.flush()?;
                info!("initialised empty alert document");
                Ok(store)
            }
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.save(&self.document)?;
        debug!(
            cities = self.document.cities.len(),
            alerts = self.document.alerts.len(),
            "flushed alert document"
        );
        Ok(())
    }
}
