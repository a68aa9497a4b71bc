//! LMDB environment setup.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use bounty_store::{LedgerRead, LedgerStore, LedgerTxn, StoreError};

use crate::txn::LmdbTxn;
use crate::LmdbError;

/// Number of named databases opened by [`LmdbEnvironment::open`].
pub const DATABASE_COUNT: u32 = 12;

/// Handles to every named database in the environment.
#[derive(Clone, Copy)]
pub(crate) struct Databases {
    pub accounts: Database<Bytes, Bytes>,
    /// Entry id (big-endian u64) to entry.
    pub entries: Database<Bytes, Bytes>,
    /// `<chain>/<entry id>` to nothing; newest-first scans per chain.
    pub chain_entries: Database<Bytes, Bytes>,
    /// `<task>/<entry id>` to nothing.
    pub task_entries: Database<Bytes, Bytes>,
    pub idempotency: Database<Bytes, Bytes>,
    pub tasks: Database<Bytes, Bytes>,
    /// `<task>/<order index>` to milestone.
    pub milestones: Database<Bytes, Bytes>,
    pub submissions: Database<Bytes, Bytes>,
    /// `<task>/<worker>` to stake record.
    pub stakes: Database<Bytes, Bytes>,
    pub workers: Database<Bytes, Bytes>,
    pub outbox: Database<Bytes, Bytes>,
    pub meta: Database<Bytes, Bytes>,
}

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Env,
    dbs: Databases,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process per path and
        // the memory map is never modified outside of heed.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs.max(DATABASE_COUNT))
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let dbs = Databases {
            accounts: env.create_database(&mut wtxn, Some("accounts"))?,
            entries: env.create_database(&mut wtxn, Some("entries"))?,
            chain_entries: env.create_database(&mut wtxn, Some("chain_entries"))?,
            task_entries: env.create_database(&mut wtxn, Some("task_entries"))?,
            idempotency: env.create_database(&mut wtxn, Some("idempotency"))?,
            tasks: env.create_database(&mut wtxn, Some("tasks"))?,
            milestones: env.create_database(&mut wtxn, Some("milestones"))?,
            submissions: env.create_database(&mut wtxn, Some("submissions"))?,
            stakes: env.create_database(&mut wtxn, Some("stakes"))?,
            workers: env.create_database(&mut wtxn, Some("workers"))?,
            outbox: env.create_database(&mut wtxn, Some("outbox"))?,
            meta: env.create_database(&mut wtxn, Some("meta"))?,
        };
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env,
            dbs,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn backend(e: heed::Error) -> StoreError {
    LmdbError::from(e).into()
}

impl LedgerStore for LmdbEnvironment {
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn LedgerRead) -> Result<R, E>,
    {
        let rtxn = self.env.read_txn().map_err(backend)?;
        let scope = LmdbTxn::new(&self.dbs, rtxn);
        f(&scope)
    }

    fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<R, E>,
    {
        // LMDB blocks here until any other write transaction finishes.
        let wtxn = self.env.write_txn().map_err(backend)?;
        let mut scope = LmdbTxn::new(&self.dbs, wtxn);
        let result = f(&mut scope)?;
        scope.into_inner().commit().map_err(backend)?;
        Ok(result)
    }
}
