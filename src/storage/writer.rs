use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{guarded, records, FlatStore, ProfileStorage, UpsertOutcome, ENABLE_LOGS};
use crate::error::StorageResult;
use crate::log_info;
use crate::models::{Session, Timing};

impl<S: FlatStore> ProfileStorage<S> {
    /// Persists `session`.
    ///
    /// The timing tree is written only when the session row is new; a re-save
    /// keeps the first tree. Client timings are rewritten on every save, and
    /// any client timing without an id gets one assigned in place.
    pub async fn save(&self, session: &mut Session) -> StorageResult<()> {
        self.save_with_cancel(session, &CancellationToken::new()).await
    }

    pub async fn save_with_cancel(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let record = records::session_to_record(session);
        let outcome = guarded(cancel, self.store.replace_session(&record)).await?;

        match outcome {
            UpsertOutcome::Inserted => {
                if let Some(root) = &session.root {
                    let written = self.save_timing_tree(root, cancel).await?;
                    log_info!("Stored session {} with {written} timings", session.id);
                }
            }
            UpsertOutcome::Replaced => {
                log_info!("Session {} already stored; keeping its timing tree", session.id);
            }
        }

        self.save_client_timings(session, cancel).await
    }

    /// Pre-order insert of every timing and its custom timings.
    async fn save_timing_tree(&self, root: &Timing, cancel: &CancellationToken) -> StorageResult<usize> {
        let mut written = 0;
        let mut stack: Vec<(&Timing, Option<Uuid>)> = vec![(root, None)];

        while let Some((timing, parent_id)) = stack.pop() {
            let record = records::timing_to_record(timing, parent_id);
            guarded(cancel, self.store.insert_timing(&record)).await?;
            written += 1;

            for (key, group) in &timing.custom_timings {
                for custom in group {
                    let record = records::custom_timing_to_record(custom, timing.id, key);
                    guarded(cancel, self.store.insert_custom_timing(&record)).await?;
                }
            }

            stack.extend(timing.children.iter().rev().map(|child| (child, Some(timing.id))));
        }

        Ok(written)
    }

    async fn save_client_timings(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let session_id = session.id;
        let Some(client) = session.client_timings.as_mut() else {
            return Ok(());
        };

        let mut kept = Vec::with_capacity(client.timings.len());
        for timing in &mut client.timings {
            let id = *timing.id.get_or_insert_with(Uuid::new_v4);
            timing.session_id = Some(session_id);

            let record = records::client_timing_to_record(timing, id, session_id);
            guarded(cancel, self.store.replace_client_timing(&record)).await?;
            kept.push(id);
        }

        let removed = guarded(
            cancel,
            self.store.delete_client_timings_except(session_id, &kept),
        )
        .await?;
        if removed > 0 {
            log_info!("Dropped {removed} stale client timings from session {session_id}");
        }

        Ok(())
    }
}
