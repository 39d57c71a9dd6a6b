//! Storage collaborator interface and the stores shipped with the engine.
//!
//! The engine only talks to [`Persistence`]. Failures come back as values;
//! the engine logs them and keeps going with its local copy of the result.

use cogex_core::TrialResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode session record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Where a saved record ended up.
///
/// `success`: at least one durable copy beyond the engine's own log.
/// `shared`: the copy reached the primary (shared) store.
/// `fallback`: the copy only exists in a fallback location.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub success: bool,
    pub shared: bool,
    pub fallback: bool,
}

impl SaveOutcome {
    pub const fn shared() -> Self {
        Self {
            success: true,
            shared: true,
            fallback: false,
        }
    }

    /// Accepted into a local buffer, not yet written anywhere shared.
    pub const fn buffered() -> Self {
        Self {
            success: true,
            shared: false,
            fallback: false,
        }
    }

    pub const fn fallback() -> Self {
        Self {
            success: true,
            shared: false,
            fallback: true,
        }
    }

    /// Nothing stored; only the engine's in-memory log holds the record.
    pub const fn local_only() -> Self {
        Self {
            success: false,
            shared: false,
            fallback: true,
        }
    }
}

pub trait Persistence {
    fn save(&mut self, result: &TrialResult) -> Result<SaveOutcome, PersistenceError>;

    /// Called once when the experiment completes.
    fn finish(&mut self) -> Result<SaveOutcome, PersistenceError> {
        Ok(SaveOutcome::buffered())
    }

    /// Called when the engine discards its session. Anything buffered for
    /// the abandoned run must be dropped so it is not stored twice.
    fn reset(&mut self) {}
}

/// Keeps nothing; the engine's logs are the only copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

impl Persistence for NullPersistence {
    fn save(&mut self, _result: &TrialResult) -> Result<SaveOutcome, PersistenceError> {
        Ok(SaveOutcome::buffered())
    }
}

pub trait KeyValueStore {
    fn upsert(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError>;

    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError>;
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, Value>>>,
    writes: Rc<RefCell<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of upserts performed so far.
    pub fn write_count(&self) -> usize {
        *self.writes.borrow()
    }
}

impl KeyValueStore for MemoryStore {
    fn upsert(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.entries.borrow_mut().insert(key.to_string(), value.clone());
        *self.writes.borrow_mut() += 1;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.entries.borrow().get(key).cloned())
    }
}

/// One pretty-printed JSON file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn upsert(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let written = write_json(&tmp, value).and_then(|()| Ok(fs::rename(&tmp, &path)?));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        debug!(path = %path.display(), "record written");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        Ok(Some(serde_json::from_reader(file)?))
    }
}

/// Writes `value` to `path` and syncs it, surfacing errors from the final
/// buffer flush.
fn write_json(path: &Path, value: &Value) -> Result<(), PersistenceError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Stored shape of one participant's session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub participant_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub results: Vec<TrialResult>,
}

/// Buffers a whole session and writes it as a single record keyed by the
/// participant id, falling back to a secondary store when the primary one
/// is unreachable.
pub struct SessionBatch {
    record: SessionRecord,
    primary: Box<dyn KeyValueStore>,
    fallback: Option<Box<dyn KeyValueStore>>,
    flush_every: usize,
}

impl SessionBatch {
    pub fn new(participant_id: impl Into<String>, primary: impl KeyValueStore + 'static) -> Self {
        Self {
            record: SessionRecord {
                participant_id: participant_id.into(),
                metadata: BTreeMap::new(),
                results: Vec::new(),
            },
            primary: Box::new(primary),
            fallback: None,
            flush_every: 0,
        }
    }

    pub fn with_fallback(mut self, fallback: impl KeyValueStore + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Also write every `n` results instead of only at the end (0 disables).
    pub fn flush_every(mut self, n: usize) -> Self {
        self.flush_every = n;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.metadata.insert(key.into(), value.into());
        self
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    fn key(&self) -> &str {
        &self.record.participant_id
    }

    fn flush(&mut self) -> Result<SaveOutcome, PersistenceError> {
        let value = serde_json::to_value(&self.record)?;
        let key = self.key().to_string();
        match self.primary.upsert(&key, &value) {
            Ok(()) => Ok(SaveOutcome::shared()),
            Err(primary_err) => {
                warn!(participant = %key, error = %primary_err, "primary store failed");
                match self.fallback.as_mut() {
                    Some(fallback) => {
                        fallback.upsert(&key, &value)?;
                        Ok(SaveOutcome::fallback())
                    }
                    None => Err(primary_err),
                }
            }
        }
    }
}

impl Persistence for SessionBatch {
    fn save(&mut self, result: &TrialResult) -> Result<SaveOutcome, PersistenceError> {
        self.record.results.push(result.clone());
        if self.flush_every > 0 && self.record.results.len() % self.flush_every == 0 {
            self.flush()
        } else {
            Ok(SaveOutcome::buffered())
        }
    }

    fn finish(&mut self) -> Result<SaveOutcome, PersistenceError> {
        self.flush()
    }

    fn reset(&mut self) {
        if !self.record.results.is_empty() {
            debug!(
                participant = %self.record.participant_id,
                dropped = self.record.results.len(),
                "discarding buffered results of an abandoned run"
            );
        }
        self.record.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::{Direction, ExperimentPhase, StimulusPayload, TrialSpec, keys};

    struct DownStore;

    impl KeyValueStore for DownStore {
        fn upsert(&mut self, _key: &str, _value: &Value) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("connection refused".to_string()))
        }

        fn get(&self, _key: &str) -> Result<Option<Value>, PersistenceError> {
            Err(PersistenceError::Unavailable("connection refused".to_string()))
        }
    }

    fn result(index: usize) -> TrialResult {
        let trial = TrialSpec {
            index,
            stimulus: StimulusPayload::Flanker {
                target: Direction::Right,
                flanker: Direction::Right,
            },
            correct_response: keys::RIGHT.to_string(),
            condition: Some("congruent".to_string()),
            set_size: None,
        };
        TrialResult::captured(&trial, ExperimentPhase::Main, keys::RIGHT, 0, 300_000_000)
    }

    #[test]
    fn session_is_written_once_at_finish() {
        let store = MemoryStore::new();
        let mut batch = SessionBatch::new("p-01", store.clone()).with_metadata("paradigm", "flanker");
        for i in 0..5 {
            assert_eq!(batch.save(&result(i)).unwrap(), SaveOutcome::buffered());
        }
        assert_eq!(store.write_count(), 0);

        assert_eq!(batch.finish().unwrap(), SaveOutcome::shared());
        assert_eq!(store.write_count(), 1);
        let stored: SessionRecord =
            serde_json::from_value(store.get("p-01").unwrap().unwrap()).unwrap();
        assert_eq!(stored.results.len(), 5);
        assert_eq!(stored.metadata["paradigm"], "flanker");
    }

    #[test]
    fn periodic_flush_upserts_the_same_key() {
        let store = MemoryStore::new();
        let mut batch = SessionBatch::new("p-02", store.clone()).flush_every(2);
        batch.save(&result(0)).unwrap();
        assert_eq!(batch.save(&result(1)).unwrap(), SaveOutcome::shared());
        batch.save(&result(2)).unwrap();
        batch.finish().unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unreachable_primary_falls_back() {
        let local = MemoryStore::new();
        let mut batch = SessionBatch::new("p-03", DownStore).with_fallback(local.clone());
        batch.save(&result(0)).unwrap();
        assert_eq!(batch.finish().unwrap(), SaveOutcome::fallback());
        assert!(local.get("p-03").unwrap().is_some());
    }

    #[test]
    fn unreachable_primary_without_fallback_reports_error() {
        let mut batch = SessionBatch::new("p-04", DownStore);
        batch.save(&result(0)).unwrap();
        assert!(matches!(batch.finish(), Err(PersistenceError::Unavailable(_))));
        assert_eq!(batch.record().results.len(), 1);
    }

    #[test]
    fn reset_drops_buffered_results() {
        let store = MemoryStore::new();
        let mut batch = SessionBatch::new("p-06", store.clone());
        batch.save(&result(0)).unwrap();
        batch.save(&result(1)).unwrap();
        batch.reset();
        batch.save(&result(0)).unwrap();
        batch.finish().unwrap();

        let stored: SessionRecord =
            serde_json::from_value(store.get("p-06").unwrap().unwrap()).unwrap();
        assert_eq!(stored.results.len(), 1);
    }

    #[test]
    fn failed_file_write_is_reported_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        // a directory in the record's place makes the final rename fail
        fs::create_dir(store.path_for("p-07")).unwrap();

        let local = MemoryStore::new();
        let mut batch = SessionBatch::new("p-07", store.clone()).with_fallback(local.clone());
        batch.save(&result(0)).unwrap();
        assert_eq!(batch.finish().unwrap(), SaveOutcome::fallback());
        assert!(local.get("p-07").unwrap().is_some());
        assert!(!store.path_for("p-07").with_extension("json.tmp").exists());
    }

    #[test]
    fn json_file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("sessions")).unwrap();
        let value = serde_json::json!({"participant_id": "p/05", "results": []});
        store.upsert("p/05", &value).unwrap();

        assert_eq!(store.path_for("p/05").file_name().unwrap(), "p_05.json");
        assert_eq!(store.get("p/05").unwrap(), Some(value));
        assert_eq!(store.get("missing").unwrap(), None);
    }
}
