use std::collections::{BTreeMap, HashSet};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{guarded, records, FlatStore, ProfileStorage, ENABLE_LOGS};
use crate::error::StorageResult;
use crate::log_warn;
use crate::models::{
    timing::by_start_then_id, ClientTimings, CustomTiming, Session, Timing,
};

struct Node {
    timing: Timing,
    children: Vec<usize>,
}

impl<S: FlatStore> ProfileStorage<S> {
    /// Loads a session and its full timing tree. `Ok(None)` means no such session.
    pub async fn load(&self, id: Uuid) -> StorageResult<Option<Session>> {
        self.load_with_cancel(id, &CancellationToken::new()).await
    }

    pub async fn load_with_cancel(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Session>> {
        let Some(record) = guarded(cancel, self.store.find_session(id)).await? else {
            return Ok(None);
        };

        let root_timing_id = record.root_timing_id;
        let redirect_count = record.client_timings_redirect_count;
        let mut session = records::record_to_session(record);

        if let Some(root_id) = root_timing_id {
            session.root = self.load_timing_tree(root_id, cancel).await?;
            if session.root.is_none() {
                log_warn!("Session {id} references missing root timing {root_id}");
            }
        }

        session.client_timings = self
            .load_client_timings(id, redirect_count, cancel)
            .await?;

        Ok(Some(session))
    }

    /// Walks the tree breadth-first with an explicit queue, then assembles it
    /// bottom-up. Every child lands at a higher arena index than its parent.
    async fn load_timing_tree(
        &self,
        root_id: Uuid,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Timing>> {
        let Some(root) = guarded(cancel, self.store.find_timing(root_id)).await? else {
            return Ok(None);
        };

        let mut seen = HashSet::from([root.id]);
        let mut nodes = vec![Node {
            timing: records::record_to_timing(root),
            children: Vec::new(),
        }];

        let mut cursor = 0;
        while cursor < nodes.len() {
            let timing_id = nodes[cursor].timing.id;
            nodes[cursor].timing.custom_timings = self.load_custom_timings(timing_id, cancel).await?;

            let mut children = guarded(cancel, self.store.find_child_timings(timing_id)).await?;
            children.sort_by(|a, b| by_start_then_id(a.start_ms, &a.id, b.start_ms, &b.id));

            for child in children {
                if !seen.insert(child.id) {
                    log_warn!("Timing {} appears more than once under {root_id}; skipping", child.id);
                    continue;
                }
                let index = nodes.len();
                nodes.push(Node {
                    timing: records::record_to_timing(child),
                    children: Vec::new(),
                });
                nodes[cursor].children.push(index);
            }
            cursor += 1;
        }

        let mut built: Vec<Option<Timing>> = (0..nodes.len()).map(|_| None).collect();
        while let Some(Node { mut timing, children }) = nodes.pop() {
            timing.children = children
                .into_iter()
                .filter_map(|index| built[index].take())
                .collect();
            built[nodes.len()] = Some(timing);
        }

        Ok(built.into_iter().next().flatten())
    }

    async fn load_custom_timings(
        &self,
        timing_id: Uuid,
        cancel: &CancellationToken,
    ) -> StorageResult<BTreeMap<String, Vec<CustomTiming>>> {
        let rows = guarded(cancel, self.store.find_custom_timings(timing_id)).await?;

        let mut groups: BTreeMap<String, Vec<CustomTiming>> = BTreeMap::new();
        for row in rows {
            let (key, custom) = records::record_to_custom_timing(row)?;
            groups.entry(key).or_default().push(custom);
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| by_start_then_id(a.start_ms, &a.id, b.start_ms, &b.id));
        }

        Ok(groups)
    }

    async fn load_client_timings(
        &self,
        session_id: Uuid,
        redirect_count: Option<u32>,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<ClientTimings>> {
        let mut timings: Vec<_> = guarded(cancel, self.store.find_client_timings(session_id))
            .await?
            .into_iter()
            .map(records::record_to_client_timing)
            .collect();

        if timings.is_empty() && redirect_count.is_none() {
            return Ok(None);
        }

        timings.sort_by(|a, b| {
            let a_id = a.id.unwrap_or_default();
            let b_id = b.id.unwrap_or_default();
            by_start_then_id(a.start_ms, &a_id, b.start_ms, &b_id)
        });

        Ok(Some(ClientTimings {
            redirect_count: redirect_count.unwrap_or(0),
            timings,
        }))
    }
}
