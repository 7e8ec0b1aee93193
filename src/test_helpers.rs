//! In-memory store fakes for tests.
//!
//! [`RecordingExecutor`] understands the handful of statements the engine itself issues
//! (ledger reads and writes, advisory lock calls) and records everything else as an
//! executed migration statement. Clones share state; each connection handed out by
//! [`RecordingExecutor::connections`] is its own lock session.

use crate::config::LEDGER_TABLE;
use crate::connection::ConnectionSource;
use crate::executor::{SqlExecutor, StoreError};
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One row written through the ledger insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub file: String,
    pub success: bool,
    pub err: Option<String>,
}

#[derive(Default)]
struct State {
    executed: Vec<String>,
    ledger: Vec<LedgerRow>,
    failures: Vec<(String, String)>,
    locks: HashMap<String, usize>,
    next_session: usize,
    open_connections: usize,
    refuse_connections: bool,
}

#[derive(Clone, Default)]
pub struct RecordingExecutor {
    state: Arc<Mutex<State>>,
    session: usize,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the state from the assertions that follow
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every statement containing `fragment` fail with `message`
    pub fn fail_on(&self, fragment: &str, message: &str) {
        self.state()
            .failures
            .push((fragment.to_string(), message.to_string()));
    }

    /// Make `acquire` on the connection source fail
    pub fn refuse_connections(&self) {
        self.state().refuse_connections = true;
    }

    /// Every statement passed to `execute`, in order
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Executed statements minus ledger bookkeeping and lock calls
    pub fn migration_statements(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|s| !s.contains(LEDGER_TABLE) && !s.contains("pg_advisory"))
            .collect()
    }

    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        self.state().ledger.clone()
    }

    /// Rows for one file, oldest first
    pub fn ledger_rows_for(&self, file: &str) -> Vec<LedgerRow> {
        self.ledger_rows()
            .into_iter()
            .filter(|row| row.file == file)
            .collect()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.state().locks.contains_key(key)
    }

    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    /// Take `key` from a session other than any handed out by `connections`
    pub fn hold_lock_elsewhere(&self, key: &str) {
        self.state().locks.insert(key.to_string(), usize::MAX);
    }

    pub fn connections(&self) -> RecordingConnections {
        RecordingConnections { store: self.clone() }
    }
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.executed.push(query.to_string());

        if query.contains("pg_advisory_unlock") {
            let key = param_str(params, 0);
            if state.locks.get(&key) == Some(&self.session) {
                state.locks.remove(&key);
            }
            return Ok(1);
        }

        if let Some((_, message)) = state
            .failures
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
        {
            return Err(StoreError::QueryError(message.clone()));
        }

        if query.starts_with(&format!("INSERT INTO {LEDGER_TABLE}")) {
            let row = LedgerRow {
                file: param_str(params, 0),
                success: param_debug(params, 1) == "true",
                err: param_opt_str(params, 2),
            };
            state.ledger.push(row);
            return Ok(1);
        }

        Ok(0)
    }

    fn query_exists(&self, query: &str, params: &[&dyn ToSql]) -> Result<bool, StoreError> {
        let mut state = self.state();

        if query.contains("pg_try_advisory_lock") {
            let key = param_str(params, 0);
            return Ok(match state.locks.get(&key) {
                Some(holder) => *holder == self.session,
                None => {
                    state.locks.insert(key, self.session);
                    true
                }
            });
        }

        if query.contains(&format!("FROM {LEDGER_TABLE}")) && query.contains("success = true") {
            let file = param_str(params, 0);
            return Ok(state.ledger.iter().any(|row| row.success && row.file == file));
        }

        Ok(false)
    }

    fn query_all(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        Ok(Vec::new())
    }
}

/// Connection source over a [`RecordingExecutor`]
pub struct RecordingConnections {
    store: RecordingExecutor,
}

impl ConnectionSource for RecordingConnections {
    fn acquire(&self) -> Result<Box<dyn SqlExecutor>, StoreError> {
        let mut state = self.store.state();
        if state.refuse_connections {
            return Err(StoreError::Other("connection refused".to_string()));
        }
        state.next_session += 1;
        state.open_connections += 1;
        let session = state.next_session;
        drop(state);

        Ok(Box::new(SessionConnection {
            store: RecordingExecutor {
                state: Arc::clone(&self.store.state),
                session,
            },
        }))
    }
}

struct SessionConnection {
    store: RecordingExecutor,
}

impl SqlExecutor for SessionConnection {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.store.execute(query, params)
    }

    fn query_exists(&self, query: &str, params: &[&dyn ToSql]) -> Result<bool, StoreError> {
        self.store.query_exists(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.store.query_all(query, params)
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        let mut state = self.store.state();
        state.open_connections -= 1;
        // closing a session frees its advisory locks
        let session = self.store.session;
        state.locks.retain(|_, holder| *holder != session);
    }
}

fn param_debug(params: &[&dyn ToSql], idx: usize) -> String {
    params
        .get(idx)
        .map(|p| format!("{:?}", p))
        .unwrap_or_default()
}

fn param_str(params: &[&dyn ToSql], idx: usize) -> String {
    unquote(&param_debug(params, idx))
}

fn param_opt_str(params: &[&dyn ToSql], idx: usize) -> Option<String> {
    let debug = param_debug(params, idx);
    debug
        .strip_prefix("Some(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(unquote)
}

/// Undo the `Debug` quoting of a string parameter
fn unquote(debug: &str) -> String {
    let inner = debug
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(debug);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
