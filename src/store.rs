//! File-backed context store
//!
//! Layout under the data directory:
//!
//! ```text
//! rules/{source}.yaml              rule sources (read-only)
//! context/ctx-{rule}-{id}.json     one record per conversation
//! ```
//!
//! All records are loaded at startup. An in-memory index maps
//! `(rule name, key)` to the single active context for that pair.

mod ids;
mod records;
mod rules;

pub use ids::{IdGenerator, RandomIds};
pub use records::ContextRecord;
pub use rules::load_rules;

use crate::context::Context;
use crate::index::IndexKey;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Attempts at allocating a fresh identifier before giving up
pub const ID_ATTEMPTS: usize = 10;

const CONTEXT_DIR: &str = "context";
const RULES_DIR: &str = "rules";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed record {}: {source}", .path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed rule source {}: {source}", .path.display())]
    RuleSource {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },
    #[error("An active context already exists for rule {rule_name} and key {key}")]
    DuplicateContext { rule_name: String, key: String },
    #[error("Untracked context #{id} for rule {rule_name}")]
    UntrackedContext { rule_name: String, id: String },
    #[error("Unable to allocate a context id after {attempts} attempts")]
    IdAllocationExhausted { attempts: usize },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe store handle
#[derive(Clone)]
pub struct ContextStore {
    inner: Arc<Mutex<StoreInner>>,
    rules_dir: PathBuf,
}

struct StoreInner {
    context_dir: PathBuf,
    ids: Box<dyn IdGenerator>,
    /// Every known context by `(rule name, id)`
    contexts: HashMap<(String, String), Context>,
    /// Active context id by `(rule name, canonical key)`
    active: HashMap<(String, String), String>,
}

impl ContextStore {
    /// Open the store rooted at `data_dir`, loading every persisted context
    pub fn open<P: AsRef<Path>>(data_dir: P) -> StoreResult<Self> {
        Self::open_with_ids(data_dir, Box::new(RandomIds))
    }

    pub fn open_with_ids<P: AsRef<Path>>(data_dir: P, ids: Box<dyn IdGenerator>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        let context_dir = data_dir.join(CONTEXT_DIR);
        fs::create_dir_all(&context_dir).map_err(|e| StoreError::io(&context_dir, e))?;

        let mut inner = StoreInner {
            context_dir,
            ids,
            contexts: HashMap::new(),
            active: HashMap::new(),
        };
        inner.load_all()?;
        tracing::info!(
            path = %data_dir.display(),
            contexts = inner.contexts.len(),
            active = inner.active.len(),
            "Context store opened"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            rules_dir: data_dir.join(RULES_DIR),
        })
    }

    /// Read the rule set from disk
    pub fn load_rules(&self) -> StoreResult<Vec<crate::context::Rule>> {
        load_rules(&self.rules_dir)
    }

    /// The active context for `(rule_name, key)`, if any
    pub fn find_active(&self, rule_name: &str, key: &IndexKey) -> Option<Context> {
        let inner = self.lock();
        let id = inner.active.get(&(rule_name.to_string(), key.canonical()))?;
        inner.contexts.get(&(rule_name.to_string(), id.clone())).cloned()
    }

    pub fn get(&self, rule_name: &str, id: &str) -> Option<Context> {
        self.lock()
            .contexts
            .get(&(rule_name.to_string(), id.to_string()))
            .cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    #[cfg(test)]
    pub fn context_count(&self) -> usize {
        self.lock().contexts.len()
    }

    /// Persist `context`.
    ///
    /// A context without an id is created under a freshly allocated id; one
    /// with an id overwrites its existing record. Returns the stored context.
    pub fn save(&self, mut context: Context) -> StoreResult<Context> {
        let mut inner = self.lock();
        let slot = (context.rule_name.clone(), context.key.canonical());

        match context.id.clone() {
            None => {
                if inner.active.contains_key(&slot) {
                    return Err(StoreError::DuplicateContext {
                        rule_name: slot.0,
                        key: slot.1,
                    });
                }
                let id = inner.create_record(&context)?;
                tracing::info!(rule = %context.rule_name, context_id = %id, "Context created");
                context.id = Some(id);
            }
            Some(id) => {
                if !inner.contexts.contains_key(&(context.rule_name.clone(), id.clone())) {
                    return Err(StoreError::UntrackedContext {
                        rule_name: context.rule_name,
                        id,
                    });
                }
                inner.overwrite_record(&context, &id)?;
                tracing::debug!(rule = %context.rule_name, context_id = %id, "Context saved");
            }
        }

        inner.track(context.clone());
        Ok(context)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StoreInner {
    fn record_path(&self, rule_name: &str, id: &str) -> PathBuf {
        self.context_dir.join(format!("ctx-{rule_name}-{id}.json"))
    }

    fn load_all(&mut self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.context_dir).map_err(|e| StoreError::io(&self.context_dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match read_record(&path) {
                Ok(record) => {
                    let context = record.into_context();
                    let slot = (context.rule_name.clone(), context.key.canonical());
                    if context.is_active() && self.active.contains_key(&slot) {
                        tracing::warn!(
                            path = %path.display(),
                            rule = %context.rule_name,
                            "Second active context for the same key, leaving it out of the index"
                        );
                        if let Some(id) = context.id.clone() {
                            self.contexts.insert((context.rule_name.clone(), id), context);
                        }
                        continue;
                    }
                    self.track(context);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable context record");
                }
            }
        }
        Ok(())
    }

    /// Write a new record under a fresh id using exclusive create
    fn create_record(&mut self, context: &Context) -> StoreResult<String> {
        for attempt in 1..=ID_ATTEMPTS {
            let id = self.ids.next_id();
            let path = self.record_path(&context.rule_name, &id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    if let Err(e) = write_record(file, &path, &ContextRecord::new(context, &id)) {
                        let _ = fs::remove_file(&path);
                        return Err(e);
                    }
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(context_id = %id, attempt, "Context id collision, retrying");
                }
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Err(StoreError::IdAllocationExhausted {
            attempts: ID_ATTEMPTS,
        })
    }

    /// Replace an existing record via write-then-rename
    fn overwrite_record(&self, context: &Context, id: &str) -> StoreResult<()> {
        let path = self.record_path(&context.rule_name, id);
        let staging = path.with_extension("json.tmp");
        let file = File::create(&staging).map_err(|e| StoreError::io(&staging, e))?;
        let written = write_record(file, &staging, &ContextRecord::new(context, id))
            .and_then(|()| fs::rename(&staging, &path).map_err(|e| StoreError::io(&path, e)));
        if written.is_err() {
            let _ = fs::remove_file(&staging);
        }
        written
    }

    /// Record `context` in memory and refresh its slot in the active index
    fn track(&mut self, context: Context) {
        let Some(id) = context.id.clone() else { return };
        let slot = (context.rule_name.clone(), context.key.canonical());
        if context.is_active() {
            self.active.insert(slot, id.clone());
        } else if self.active.get(&slot) == Some(&id) {
            self.active.remove(&slot);
        }
        self.contexts.insert((context.rule_name.clone(), id), context);
    }
}

fn read_record(path: &Path) -> StoreResult<ContextRecord> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| StoreError::Record {
        path: path.to_path_buf(),
        source,
    })
}

fn write_record(file: File, path: &Path, record: &ContextRecord) -> StoreResult<()> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record).map_err(|source| StoreError::Record {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| StoreError::io(path, e))
}
