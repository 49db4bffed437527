//! Metadata persistence without a SQL engine: one JSON file per record,
//! the way the lineage this engine is descended from persists its own
//! mutable process state. Good enough per the single-node Non-goal — there
//! is no distributed store to keep consistent.

use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

pub struct MetadataStore<T> {
    dir: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> MetadataStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(dir: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _marker: PhantomData,
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn save(&self, id: &str, record: &T) -> CoreResult<()> {
        let path = self.record_path(id);
        let content = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> CoreResult<T> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(CoreError::not_found(format!("no record '{id}'")));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn list(&self) -> CoreResult<Vec<T>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)?;
                records.push(serde_json::from_str(&content)?);
            }
        }
        Ok(records)
    }

    /// Load the record, hand it to `mutate` for an in-place, guarded
    /// transition (the caller checks the expected current state itself and
    /// returns a `state_conflict` if it doesn't match), then persist it.
    /// The in-process analogue of a `WHERE status = <expected>` guard.
    pub fn update<F>(&self, id: &str, mutate: F) -> CoreResult<T>
    where
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        let mut record = self.load(id)?;
        mutate(&mut record)?;
        self.save(id, &record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        id: String,
        status: String,
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Dummy> = MetadataStore::new(dir.path()).unwrap();
        let record = Dummy {
            id: "abc".to_string(),
            status: "draft".to_string(),
        };
        store.save("abc", &record).unwrap();
        assert_eq!(store.load("abc").unwrap(), record);
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Dummy> = MetadataStore::new(dir.path()).unwrap();
        let err = store.load("missing").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn update_guards_on_expected_status() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Dummy> = MetadataStore::new(dir.path()).unwrap();
        store
            .save(
                "abc",
                &Dummy {
                    id: "abc".to_string(),
                    status: "draft".to_string(),
                },
            )
            .unwrap();

        let result = store.update("abc", |d| {
            if d.status != "pending_review" {
                return Err(CoreError::state_conflict("not pending review"));
            }
            d.status = "approved".to_string();
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.load("abc").unwrap().status, "draft");
    }

    #[test]
    fn list_returns_every_saved_record() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Dummy> = MetadataStore::new(dir.path()).unwrap();
        store
            .save("a", &Dummy { id: "a".into(), status: "draft".into() })
            .unwrap();
        store
            .save("b", &Dummy { id: "b".into(), status: "draft".into() })
            .unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
