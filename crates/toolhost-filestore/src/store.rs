//! The content-addressed file store: SQLite metadata plus UUID-named blobs
//! (§4.6).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::FileInfo;

const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// First-class, cross-tool file persistence (§4.6).
///
/// One lock guards the database handle implicitly through `sqlx`'s own
/// connection pool; row and blob mutations are otherwise unsynchronised
/// beyond what SQLite itself serialises, matching §5's "File Store: one
/// lock guards the database handle".
pub struct FileStore {
    pool: SqlitePool,
    blobs_root: PathBuf,
}

impl FileStore {
    /// Open (creating if absent) the metadata database at `db_path`,
    /// rooting blobs under `blobs_root`.
    pub async fn open(db_path: impl AsRef<Path>, blobs_root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let blobs_root = blobs_root.into();
        tokio::fs::create_dir_all(&blobs_root)
            .await
            .map_err(|source| StoreError::Io { path: blobs_root.clone(), source })?;

        let database_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&database_url).await?;
        let store = Self { pool, blobs_root };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                digest TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.blobs_root.join(id.to_string())
    }

    /// Stream `reader` into a new blob while computing its content digest,
    /// then insert the row. `ttl_secs == 0` means the file never expires.
    /// On any failure after the blob is written, the blob is removed
    /// (§4.6: "Import").
    #[instrument(skip(self, reader))]
    pub async fn import<R: AsyncRead + Unpin>(
        &self,
        name: impl Into<String>,
        mut reader: R,
        ttl_secs: i64,
    ) -> Result<FileInfo, StoreError> {
        let id = Uuid::new_v4();
        let path = self.blob_path(&id);
        let name = name.into();

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;

        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buf).await.map_err(|source| StoreError::Io { path: path.clone(), source })?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            size += read as u64;
            if let Err(source) = file.write_all(&buf[..read]).await {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(StoreError::Io { path, source });
            }
        }
        if let Err(source) = file.flush().await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StoreError::Io { path, source });
        }
        drop(file);

        let digest = hex::encode(hasher.finalize());
        let created_at = Utc::now();
        let expires_at = if ttl_secs > 0 { created_at.timestamp() + ttl_secs } else { 0 };

        let inserted = sqlx::query(
            "INSERT INTO files (id, name, size, digest, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&name)
        .bind(size as i64)
        .bind(&digest)
        .bind(created_at.to_rfc3339())
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(err) = inserted {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StoreError::Database(err));
        }

        info!(%id, size, "imported file");
        Ok(FileInfo { id, name, size, digest, created_at, expires_at })
    }

    /// The absolute blob path for `id`, for trusted in-process callers
    /// (§4.6: "exposes the blob path directly to trusted in-process
    /// callers; HTTP callers must use the content route").
    pub async fn get_path(&self, id: Uuid) -> Result<PathBuf, StoreError> {
        self.info(id).await?;
        Ok(self.blob_path(&id))
    }

    /// Row metadata for `id`.
    pub async fn info(&self, id: Uuid) -> Result<FileInfo, StoreError> {
        let row = sqlx::query("SELECT id, name, size, digest, created_at, expires_at FROM files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        Ok(row_to_info(&row))
    }

    /// All rows, newest first; expired rows are excluded unless
    /// `include_expired` is set (§4.6: "List").
    pub async fn list(&self, include_expired: bool) -> Result<Vec<FileInfo>, StoreError> {
        let rows = if include_expired {
            sqlx::query("SELECT id, name, size, digest, created_at, expires_at FROM files ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?
        } else {
            let now = Utc::now().timestamp();
            sqlx::query(
                "SELECT id, name, size, digest, created_at, expires_at FROM files \
                 WHERE expires_at = 0 OR expires_at > ? ORDER BY created_at DESC",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows.iter().map(row_to_info).collect())
    }

    /// Rename the row's display name.
    pub async fn rename(&self, id: Uuid, new_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE files SET name = ? WHERE id = ?")
            .bind(new_name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Reset the row's expiration: `ttl == 0` marks it permanent,
    /// `ttl > 0` sets `expires_at = now + ttl` (§4.6: "Rename / SetTTL").
    pub async fn set_ttl(&self, id: Uuid, ttl_secs: i64) -> Result<(), StoreError> {
        let expires_at = if ttl_secs > 0 { Utc::now().timestamp() + ttl_secs } else { 0 };
        let result = sqlx::query("UPDATE files SET expires_at = ? WHERE id = ?")
            .bind(expires_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Remove the row, then the blob. A missing blob is tolerated
    /// (§4.6: "Delete").
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        match tokio::fs::remove_file(self.blob_path(&id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Io { path: self.blob_path(&id), source }),
        }
        Ok(())
    }

    /// Delete every row with `0 < expires_at <= now`, row then blob.
    /// Returns the number of rows reaped (§4.6: "Garbage collection").
    #[instrument(skip(self))]
    pub async fn gc_once(&self) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query("SELECT id FROM files WHERE expires_at > 0 AND expires_at <= ?")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        let mut reaped = 0;
        for row in rows {
            let id_text: String = row.get("id");
            let Ok(id) = Uuid::parse_str(&id_text) else { continue };
            match self.delete(id).await {
                Ok(()) => reaped += 1,
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => warn!(%id, error = %err, "gc failed to delete expired file"),
            }
        }
        if reaped > 0 {
            debug!(reaped, "gc reaped expired files");
        }
        Ok(reaped)
    }

    /// Run `gc_once` on a 5-minute tick until `token` is cancelled.
    pub async fn run_gc(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(GC_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(err) = self.gc_once().await {
                        warn!(error = %err, "gc tick failed");
                    }
                }
            }
        }
    }
}

fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> FileInfo {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    FileInfo {
        id: Uuid::parse_str(&id).expect("stored id is always a valid uuid"),
        name: row.get("name"),
        size: row.get::<i64, _>("size") as u64,
        digest: row.get("digest"),
        created_at: DateTime::parse_from_rfc3339(&created_at).expect("stored timestamp is always rfc3339").with_timezone(&Utc),
        expires_at: row.get("expires_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn open_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("files.db"), dir.path().join("blobs")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn import_then_info_round_trips() {
        let (_dir, store) = open_store().await;
        let info = store.import("notes.txt", Cursor::new(b"hello world".to_vec()), 0).await.unwrap();
        assert_eq!(info.size, 11);
        assert_eq!(info.expires_at, 0);

        let fetched = store.info(info.id).await.unwrap();
        assert_eq!(fetched.digest, info.digest);

        let path = store.get_path(info.id).await.unwrap();
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn digest_matches_sha256_of_content() {
        let (_dir, store) = open_store().await;
        let info = store.import("a.bin", Cursor::new(b"abc".to_vec()), 0).await.unwrap();
        let expected = hex::encode(Sha256::digest(b"abc"));
        assert_eq!(info.digest, expected);
    }

    #[tokio::test]
    async fn list_excludes_expired_by_default() {
        let (_dir, store) = open_store().await;
        let live = store.import("live.txt", Cursor::new(b"x".to_vec()), 0).await.unwrap();
        let expiring = store.import("gone.txt", Cursor::new(b"y".to_vec()), 1).await.unwrap();
        store.set_ttl(expiring.id, -1).await.ok();
        sqlx::query("UPDATE files SET expires_at = 1 WHERE id = ?")
            .bind(expiring.id.to_string())
            .execute(&store.pool)
            .await
            .unwrap();

        let visible = store.list(false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, live.id);

        let all = store.list(true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn set_ttl_zero_marks_permanent() {
        let (_dir, store) = open_store().await;
        let info = store.import("f.txt", Cursor::new(b"z".to_vec()), 60).await.unwrap();
        assert!(info.expires_at > 0);
        store.set_ttl(info.id, 0).await.unwrap();
        assert_eq!(store.info(info.id).await.unwrap().expires_at, 0);
    }

    #[tokio::test]
    async fn delete_removes_row_and_tolerates_missing_blob() {
        let (_dir, store) = open_store().await;
        let info = store.import("f.txt", Cursor::new(b"z".to_vec()), 0).await.unwrap();
        let path = store.get_path(info.id).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        store.delete(info.id).await.unwrap();
        assert!(matches!(store.info(info.id).await.unwrap_err(), StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn gc_once_reaps_only_expired_rows() {
        let (_dir, store) = open_store().await;
        let permanent = store.import("keep.txt", Cursor::new(b"a".to_vec()), 0).await.unwrap();
        let expired = store.import("reap.txt", Cursor::new(b"b".to_vec()), 60).await.unwrap();
        sqlx::query("UPDATE files SET expires_at = 1 WHERE id = ?")
            .bind(expired.id.to_string())
            .execute(&store.pool)
            .await
            .unwrap();

        let reaped = store.gc_once().await.unwrap();
        assert_eq!(reaped, 1);
        assert!(store.info(permanent.id).await.is_ok());
        assert!(store.info(expired.id).await.is_err());
    }
}
