use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct SessionDbInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionDbInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create session_kv table")?;
    Ok(())
}

/// Session-lived key-value store backed by SQLite.
///
/// The connection is owned by a dedicated worker thread; callers hand it
/// closures over a channel and block on the reply, so every operation is
/// synchronous from the caller's perspective. Values are plain text; the
/// persistence adapter decides on serialization.
#[derive(Clone)]
pub struct SessionDb {
    inner: Arc<SessionDbInner>,
    db_path: Arc<PathBuf>,
}

impl SessionDb {
    pub fn open(db_path: PathBuf) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("flex2map-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(
                            anyhow::Error::new(err).context("failed to open session store")
                        ));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result = init_schema(&conn);
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Session store thread shutting down");
            })
            .with_context(|| "failed to spawn store worker thread")
            .map_err(crate::Error::Persistence)?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")
            .map_err(crate::Error::Persistence)??;

        info!("Session store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(SessionDbInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub fn execute<F, T>(&self, task: F) -> crate::Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        let result = reply_rx
            .recv()
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))??;
        Ok(result)
    }

    pub fn get(&self, key: &str) -> crate::Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM session_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| "failed to read session value")
        })
    }

    pub fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO session_kv (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| "failed to write session value")?;
            Ok(())
        })
    }

    pub fn remove(&self, key: &str) -> crate::Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM session_kv WHERE key = ?1", params![key])
                .with_context(|| "failed to delete session value")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SessionDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SessionDb::open(dir.path().join("session.sqlite3")).expect("open store");
        (dir, db)
    }

    #[test]
    fn absent_key_reads_back_as_none() {
        let (_dir, db) = open_temp();
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, db) = open_temp();
        db.set("k", "v1").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("v1"));

        db.set("k", "v2").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn remove_deletes_the_key() {
        let (_dir, db) = open_temp();
        db.set("k", "v").unwrap();
        db.remove("k").unwrap();
        assert_eq!(db.get("k").unwrap(), None);
    }

    #[test]
    fn values_survive_reopening_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.sqlite3");

        {
            let db = SessionDb::open(path.clone()).expect("open store");
            db.set("k", "kept").unwrap();
        }

        let db = SessionDb::open(path).expect("reopen store");
        assert_eq!(db.get("k").unwrap().as_deref(), Some("kept"));
    }
}
