//! Store engine: query façade and format-preserving mutations
//!
//! Every operation re-reads the store from disk; nothing is cached between
//! calls. Destructive operations follow the same sequence:
//!
//! ```text
//! lock -> read -> backup (verified) -> select complement -> rewrite -> drop backup
//!                          \-- any failure after backup: restore from backup --/
//! ```
//!
//! Delete never removes records in place. It asks the evaluator for the
//! records that do *not* match and rewrites the store with those, putting
//! back the type declaration the evaluator does not echo.

pub mod guard;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::eval::{Evaluator, OutputShape, Recutils, Selection};
use crate::exec::OpContext;
use crate::format::{self, Record};
use crate::outcome::Outcome;
use guard::{Backup, StoreLock};
use serde_json::{Map, Value};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// A selection request as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Selection expression (None or blank = every record)
    pub predicate: Option<String>,
    /// Output shape name: rec, csv, count or collapsed
    pub output_format: Option<String>,
    /// Restrict to one record set
    pub record_type: Option<String>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn output_format(mut self, output_format: impl Into<String>) -> Self {
        self.output_format = Some(output_format.into());
        self
    }

    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    fn to_selection(&self) -> Result<Selection> {
        let shape = match self.output_format.as_deref() {
            Some(name) => name.parse()?,
            None => OutputShape::Rec,
        };
        Ok(Selection {
            predicate: self.predicate.clone().filter(|p| !p.trim().is_empty()),
            record_type: self.record_type.clone().filter(|t| !t.trim().is_empty()),
            shape,
        })
    }
}

/// Engine over flat recfile stores
#[derive(Clone)]
pub struct RecordStore {
    evaluator: Arc<dyn Evaluator>,
    config: EngineConfig,
}

impl RecordStore {
    /// Engine backed by GNU recutils
    pub fn new(config: EngineConfig) -> Self {
        let evaluator = Arc::new(Recutils::new(config.clone()));
        Self { evaluator, config }
    }

    /// Engine backed by any evaluation capability
    pub fn with_evaluator(evaluator: Arc<dyn Evaluator>, config: EngineConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Select records. Pure pass-through to the evaluator.
    pub async fn query(&self, store: &Path, request: &QueryRequest, cx: &OpContext) -> Outcome {
        match request.to_selection() {
            Ok(selection) => self.evaluator.select(store, &selection, cx).await,
            Err(err) => err.into(),
        }
    }

    /// Describe the store through the evaluator
    pub async fn info(&self, store: &Path, cx: &OpContext) -> Outcome {
        self.evaluator.describe(store, cx).await
    }

    /// Append one record, creating the store (with its declaration) if needed
    pub async fn insert(
        &self,
        store: &Path,
        record_type: &str,
        fields: &Map<String, Value>,
        cx: &OpContext,
    ) -> Outcome {
        match self.try_insert(store, record_type, fields, cx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("Insert into {} failed: {}", store.display(), err);
                err.into()
            }
        }
    }

    /// Remove every record matching `predicate`
    pub async fn delete(&self, store: &Path, predicate: &str, cx: &OpContext) -> Outcome {
        match self.try_delete(store, predicate, cx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("Delete from {} failed: {}", store.display(), err);
                err.into()
            }
        }
    }

    /// Apply `changes` to every record matching `predicate`.
    ///
    /// Each matched record is updated on its own: existing lines for a
    /// field are rewritten, missing fields are appended. Updated records
    /// are written after the untouched ones. A predicate matching nothing
    /// leaves the file untouched and still reports success.
    pub async fn update(
        &self,
        store: &Path,
        predicate: &str,
        changes: &Map<String, Value>,
        cx: &OpContext,
    ) -> Outcome {
        match self.try_update(store, predicate, changes, cx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("Update of {} failed: {}", store.display(), err);
                err.into()
            }
        }
    }

    async fn try_insert(
        &self,
        store: &Path,
        record_type: &str,
        fields: &Map<String, Value>,
        cx: &OpContext,
    ) -> Result<Outcome> {
        if fields.is_empty() {
            return Err(Error::InvalidArgument(
                "fields must contain at least one field".to_string(),
            ));
        }
        let record = format::record_from_map(fields)?;
        let declaration = match record_type.trim() {
            "" => None,
            rtype => Some(format::type_declaration(rtype)?),
        };
        let store = &resolve_store(store).await?;
        let _lock = self.lock(store, cx).await?;

        let existing_len = match tokio::fs::metadata(store).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if existing_len == 0 {
            let contents = format::compose_store(declaration.as_deref(), &[record.render()]);
            tokio::fs::write(store, contents).await?;
            tracing::info!("Created {} with first record", store.display());
        } else {
            append_record(store, &record).await?;
            tracing::info!("Appended record to {}", store.display());
        }

        Ok(Outcome::ok("Record inserted successfully"))
    }

    async fn try_delete(&self, store: &Path, predicate: &str, cx: &OpContext) -> Result<Outcome> {
        require_predicate(predicate)?;
        // Fail on a missing store before a lock file is created next to it
        tokio::fs::metadata(store).await?;
        let store = &resolve_store(store).await?;
        let _lock = self.lock(store, cx).await?;

        let original = tokio::fs::read(store).await?;
        let token = guard::operation_token();
        let backup = Backup::create(store, &original, &token).await?;
        let declaration = format::extract_type_declaration(&String::from_utf8_lossy(&original));

        let keep = self.select_complement(store, predicate, cx).await;
        if !keep.success {
            restore_and_discard(backup).await?;
            return Ok(keep);
        }

        let contents = format::compose_store(declaration.as_deref(), &[keep.output]);
        commit(store, backup, &contents, &token).await?;

        tracing::info!("Deleted records matching '{}' from {}", predicate, store.display());
        Ok(Outcome::ok(format!(
            "Records matching '{}' deleted successfully",
            predicate
        )))
    }

    async fn try_update(
        &self,
        store: &Path,
        predicate: &str,
        changes: &Map<String, Value>,
        cx: &OpContext,
    ) -> Result<Outcome> {
        require_predicate(predicate)?;
        if changes.is_empty() {
            return Err(Error::InvalidArgument(
                "fields must contain at least one field to change".to_string(),
            ));
        }
        let changes = format::record_from_map(changes)?;
        tokio::fs::metadata(store).await?;
        let store = &resolve_store(store).await?;
        let _lock = self.lock(store, cx).await?;

        let matched = self
            .evaluator
            .select(store, &Selection::matching(predicate), cx)
            .await;
        if !matched.success {
            return Ok(matched);
        }
        let mut records = format::parse_records(&matched.output);
        if records.is_empty() {
            return Ok(Outcome::ok(format!(
                "No records matched '{}'; nothing updated",
                predicate
            )));
        }

        let original = tokio::fs::read(store).await?;
        let token = guard::operation_token();
        let backup = Backup::create(store, &original, &token).await?;
        let declaration = format::extract_type_declaration(&String::from_utf8_lossy(&original));

        let keep = self.select_complement(store, predicate, cx).await;
        if !keep.success {
            restore_and_discard(backup).await?;
            return Ok(keep);
        }

        for record in &mut records {
            for change in changes.fields() {
                record.set(&change.name, &change.value);
            }
        }

        let mut blocks = vec![keep.output];
        blocks.extend(records.iter().map(Record::render));
        let contents = format::compose_store(declaration.as_deref(), &blocks);
        commit(store, backup, &contents, &token).await?;

        tracing::info!(
            "Updated {} record(s) matching '{}' in {}",
            records.len(),
            predicate,
            store.display()
        );
        Ok(Outcome::ok(format!(
            "Records updated successfully ({} matching '{}')",
            records.len(),
            predicate
        )))
    }

    async fn select_complement(&self, store: &Path, predicate: &str, cx: &OpContext) -> Outcome {
        let negated = self.evaluator.negate(predicate);
        self.evaluator
            .select(store, &Selection::matching(negated), cx)
            .await
    }

    async fn lock(&self, store: &Path, cx: &OpContext) -> Result<Option<StoreLock>> {
        if !self.config.use_lock {
            return Ok(None);
        }
        StoreLock::acquire(store, self.config.lock_timeout, cx)
            .await
            .map(Some)
    }
}

/// Follow symlinks so rewrites replace the real file, not the link.
/// A store that does not exist yet resolves through its directory.
async fn resolve_store(store: &Path) -> Result<PathBuf> {
    match tokio::fs::canonicalize(store).await {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let parent = store.parent().filter(|p| !p.as_os_str().is_empty());
            match (parent, store.file_name()) {
                (Some(parent), Some(name)) => match tokio::fs::canonicalize(parent).await {
                    Ok(dir) => Ok(dir.join(name)),
                    Err(_) => Ok(store.to_path_buf()),
                },
                _ => Ok(store.to_path_buf()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn require_predicate(predicate: &str) -> Result<()> {
    if predicate.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "query_expression must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Append `\n<record>\n`, first repairing a missing final newline
async fn append_record(store: &Path, record: &Record) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .append(true)
        .open(store)
        .await?;

    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;

    let mut chunk = String::new();
    if last[0] != b'\n' {
        chunk.push('\n');
    }
    chunk.push('\n');
    chunk.push_str(&record.render());
    chunk.push('\n');

    file.write_all(chunk.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Rewrite the store; on failure put the backup back before reporting
async fn commit(store: &Path, backup: Backup, contents: &str, token: &str) -> Result<()> {
    match guard::replace_contents(store, contents.as_bytes(), token).await {
        Ok(()) => {
            if let Err(e) = backup.discard().await {
                tracing::warn!("Rewrote {} but could not remove backup: {}", store.display(), e);
            }
            Ok(())
        }
        Err(err) => {
            tracing::warn!("Rewrite of {} failed: {}; restoring", store.display(), err);
            restore_and_discard(backup).await?;
            Err(err)
        }
    }
}

/// Put the original bytes back. The backup is kept if that fails.
async fn restore_and_discard(backup: Backup) -> Result<()> {
    if let Err(e) = backup.restore().await {
        tracing::error!(
            "Could not restore from {}: {}; backup kept for manual recovery",
            backup.path().display(),
            e
        );
        return Err(Error::Io(std::io::Error::other(format!(
            "restore failed ({}); original content kept at {}",
            e,
            backup.path().display()
        ))));
    }
    let path = backup.path().to_path_buf();
    if let Err(e) = backup.discard().await {
        tracing::warn!("Could not remove backup {}: {}", path.display(), e);
    }
    Ok(())
}
