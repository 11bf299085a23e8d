//! Paged deletion of remote collections.

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::lookup::QuestionLookup;
use crate::report::ClearReport;
use chrono::Utc;
use quizsync_model::{Document, SyncMetadata, METADATA_DOC_ID};
use quizsync_store::{CollectionRef, LocalStore, RemoteStore, WriteBatch};
use tracing::{debug, info};

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Deletes every document in `collection`, one bounded batch at a time.
    ///
    /// Stops when a fetch returns fewer documents than the batch size.
    /// Clearing an empty collection succeeds with zero deletions. Returns
    /// the number of deleted documents.
    pub async fn clear_collection(&self, collection: &CollectionRef) -> SyncResult<usize> {
        let size = self.batch_size();
        let mut deleted = 0;
        loop {
            let docs = self.remote.list(collection, Some(size)).await?;
            let fetched = docs.len();
            if fetched == 0 {
                break;
            }
            let mut batch = WriteBatch::new();
            for doc in docs {
                batch.delete(collection, doc.id);
            }
            self.remote.commit(batch).await?;
            deleted += fetched;
            debug!(%collection, deleted, "deleted page");
            if fetched < size {
                break;
            }
        }
        Ok(deleted)
    }

    /// Clears the three data collections concurrently, then writes zeroed
    /// metadata.
    ///
    /// A failing clear does not cancel the others; the first error is
    /// returned after all three finish and the metadata is left unchanged.
    pub async fn clear_all(&self) -> SyncResult<ClearReport> {
        let collections = self.collections()?;
        let (seen, mistakes, preferences) = tokio::join!(
            self.clear_collection(&collections.seen),
            self.clear_collection(&collections.mistakes),
            self.clear_collection(&collections.preferences),
        );
        let report = ClearReport {
            seen_questions: seen?,
            mistakes: mistakes?,
            preferences: preferences?,
        };

        let metadata = SyncMetadata::zeroed(Utc::now());
        self.remote
            .set(&collections.sync, METADATA_DOC_ID, metadata.to_document()?)
            .await?;
        info!(deleted = report.total(), "remote collections cleared");
        Ok(report)
    }
}
