use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::identity::domain::identity_store::{IdentityStore, UserRecord};

#[derive(Error, Debug)]
pub enum IdentityStoreError {
    #[error("failed to read identity store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid identity store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate user id {0}")]
    DuplicateId(i32),
}

/// Identity store backed by a JSON array of [`UserRecord`]s, loaded once.
#[derive(Debug, Clone, Default)]
pub struct JsonIdentityStore {
    users: HashMap<i32, UserRecord>,
}

impl JsonIdentityStore {
    pub fn load(path: &Path) -> Result<Self, IdentityStoreError> {
        let json = fs::read_to_string(path).map_err(|source| IdentityStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<UserRecord> =
            serde_json::from_str(&json).map_err(|source| IdentityStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let store = Self::from_records(records)?;
        log::info!(
            "Loaded {} identities from {}",
            store.users.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_records(records: Vec<UserRecord>) -> Result<Self, IdentityStoreError> {
        let mut users = HashMap::with_capacity(records.len());
        for record in records {
            let id = record.id;
            if users.insert(id, record).is_some() {
                return Err(IdentityStoreError::DuplicateId(id));
            }
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityStore for JsonIdentityStore {
    fn find_one(&self, id: i32) -> Option<UserRecord> {
        self.users.get(&id).filter(|u| !u.archived).cloned()
    }
}
