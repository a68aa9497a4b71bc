//! Backend selection.

use bounty_nullables::NullStore;
use bounty_store::{LedgerRead, LedgerStore, LedgerTxn, StoreError};
use bounty_store_lmdb::environment::DATABASE_COUNT;
use bounty_store_lmdb::LmdbEnvironment;

use crate::config::{NodeConfig, StorageKind};
use crate::NodeError;

/// The backend chosen by [`NodeConfig::storage`].
pub enum EngineStore {
    Memory(NullStore),
    Lmdb(LmdbEnvironment),
}

impl EngineStore {
    pub fn open(config: &NodeConfig) -> Result<Self, NodeError> {
        match config.storage {
            StorageKind::Memory => {
                tracing::warn!("using in-memory storage; balances will not survive a restart");
                Ok(EngineStore::Memory(NullStore::new()))
            }
            StorageKind::Lmdb => {
                let env = LmdbEnvironment::open(
                    &config.data_dir,
                    DATABASE_COUNT,
                    config.lmdb_map_size,
                )?;
                tracing::info!(path = %env.path().display(), "opened LMDB ledger");
                Ok(EngineStore::Lmdb(env))
            }
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            EngineStore::Memory(_) => StorageKind::Memory,
            EngineStore::Lmdb(_) => StorageKind::Lmdb,
        }
    }
}

impl LedgerStore for EngineStore {
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn LedgerRead) -> Result<R, E>,
    {
        match self {
            EngineStore::Memory(store) => store.read(f),
            EngineStore::Lmdb(store) => store.read(f),
        }
    }

    fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<R, E>,
    {
        match self {
            EngineStore::Memory(store) => store.write(f),
            EngineStore::Lmdb(store) => store.write(f),
        }
    }
}
