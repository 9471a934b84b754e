use std::collections::HashSet;
#[cfg(feature = "native")]
use std::sync::Arc;
#[cfg(feature = "native")]
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use super::header::OpLinks;
use super::packer::CausalHistoryPacker;
use super::state::CausalHistoryState;
use crate::core::{HashspaceError, Result};
use crate::literal::{Hash, LiteralContext};
use crate::model::HashedObject;
use crate::store::Store;

/// What a network layer needs from a replica of one mutable object.
#[async_trait]
pub trait StateSyncAgent: Send + Sync {
    fn mutable_obj(&self) -> &Hash;

    async fn get_stored_state(&self) -> Result<CausalHistoryState>;

    /// Receiver that sees every change of the stored state.
    fn watch_stored_state(&self) -> watch::Receiver<Option<CausalHistoryState>>;

    /// Terminal ops of `remote` this replica does not have.
    async fn evaluate_remote_state(&self, remote: &CausalHistoryState) -> Result<Vec<Hash>>;

    /// Delivers fetched literals into the local store.
    async fn receive_literals(&self, literals: &LiteralContext) -> Result<usize>;
}

/// [`StateSyncAgent`] over a [`Store`], comparing terminal-op states.
pub struct CausalHistoryAgent {
    store: Store,
    mutable_obj: Hash,
    state: watch::Sender<Option<CausalHistoryState>>,
}

impl CausalHistoryAgent {
    pub fn new(store: Store, mutable_obj: Hash) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            store,
            mutable_obj,
            state,
        }
    }

    /// Re-reads the stored state. Returns whether it changed.
    pub async fn refresh(&self) -> Result<bool> {
        let state = self.store.causal_history_state(&self.mutable_obj).await?;
        self.publish(state)
    }

    fn publish(&self, state: CausalHistoryState) -> Result<bool> {
        let hash = state.try_hash()?;
        let mut next = Some(state);
        let changed = self.state.send_if_modified(|current| {
            let unchanged = current
                .as_ref()
                .is_some_and(|c| c.try_hash().ok().as_ref() == Some(&hash));
            if unchanged {
                false
            } else {
                *current = next.take();
                true
            }
        });
        if changed {
            info!(object = %self.mutable_obj.short(), state = %hash.short(), "stored state changed");
        }
        Ok(changed)
    }

    /// Packs, in causal order and within `max_objects`, the local ops that
    /// are not in the past of `remote`'s terminal ops.
    pub async fn pack_missing(
        &self,
        remote: &CausalHistoryState,
        max_objects: usize,
    ) -> Result<LiteralContext> {
        let remote_past = self.past_of(remote.terminal_ops().cloned()).await?;
        let local = self.store.terminal_ops(&self.mutable_obj).await?;

        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<Hash> = local.into_iter().collect();
        while let Some(op) = stack.pop() {
            if remote_past.contains(&op) || !seen.insert(op.clone()) {
                continue;
            }
            if let Some(links) = self.links(&op).await? {
                stack.extend(links.prev_ops);
            }
            missing.push(op);
        }

        let mut packer = CausalHistoryPacker::new(self.store.clone(), Some(remote), max_objects).await?;
        let packed = packer.add_ops(&missing).await?;
        debug!(
            object = %self.mutable_obj.short(),
            missing = missing.len(),
            packed = packed.len(),
            "packed ops for peer"
        );
        Ok(packer.into_context())
    }

    async fn links(&self, op: &Hash) -> Result<Option<OpLinks>> {
        Ok(self
            .store
            .load_literal(op)
            .await?
            .as_ref()
            .and_then(OpLinks::of))
    }

    /// Every locally known op in the causal past of `ops`, inclusive.
    async fn past_of(&self, ops: impl Iterator<Item = Hash>) -> Result<HashSet<Hash>> {
        let mut past = HashSet::new();
        let mut stack: Vec<Hash> = ops.collect();
        while let Some(op) = stack.pop() {
            if !past.insert(op.clone()) {
                continue;
            }
            if let Some(links) = self.links(&op).await? {
                stack.extend(links.prev_ops);
            }
        }
        Ok(past)
    }

    /// Refreshes on every terminal-op change of this object, and every
    /// `refresh_every` regardless.
    #[cfg(feature = "native")]
    pub fn spawn(self: Arc<Self>, refresh_every: Duration) -> tokio::task::JoinHandle<()> {
        use crate::store::StoreEvent;
        use tokio::sync::broadcast::error::RecvError;
        use tracing::warn;

        let mut events = self.store.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_every);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(StoreEvent::TerminalOpsChanged { target }) if target == self.mutable_obj => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "agent lagged behind store events, refreshing");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {}
                }
                if let Err(e) = self.refresh().await {
                    warn!(object = %self.mutable_obj.short(), error = %e, "state refresh failed");
                }
            }
        })
    }
}

#[async_trait]
impl StateSyncAgent for CausalHistoryAgent {
    fn mutable_obj(&self) -> &Hash {
        &self.mutable_obj
    }

    async fn get_stored_state(&self) -> Result<CausalHistoryState> {
        let state = self.store.causal_history_state(&self.mutable_obj).await?;
        self.publish(state.clone())?;
        Ok(state)
    }

    fn watch_stored_state(&self) -> watch::Receiver<Option<CausalHistoryState>> {
        self.state.subscribe()
    }

    async fn evaluate_remote_state(&self, remote: &CausalHistoryState) -> Result<Vec<Hash>> {
        if remote.mutable_obj() != &self.mutable_obj {
            return Err(HashspaceError::ValidationFailed(format!(
                "remote state is for {}, not {}",
                remote.mutable_obj().short(),
                self.mutable_obj.short()
            )));
        }
        let local = self.get_stored_state().await?;
        let mut missing = Vec::new();
        for op in local.terminal_ops_missing_from(remote) {
            if self.store.load_literal(&op).await?.is_none() {
                missing.push(op);
            }
        }
        Ok(missing)
    }

    async fn receive_literals(&self, literals: &LiteralContext) -> Result<usize> {
        let stored = self.store.receive_literals(literals).await?;
        if stored > 0 {
            self.refresh().await?;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keyring;
    use std::sync::Arc;
    use crate::mutable::{MutableObject, MutableSet};

    fn store() -> (Store, Arc<Keyring>) {
        let keyring = Arc::new(Keyring::new());
        (Store::in_memory(keyring.clone()), keyring)
    }

    #[tokio::test]
    async fn test_state_follows_saved_ops() {
        let (store, keyring) = store();
        let writer = keyring.generate(Some("writer"));
        let mut set: MutableSet<String> = MutableSet::with_writers([writer.clone()]);
        set.set_id("notes");
        let target = store.save_mutable(&mut set).await.unwrap();

        let agent = CausalHistoryAgent::new(store.clone(), target.clone());
        let mut watcher = agent.watch_stored_state();
        assert!(agent.get_stored_state().await.unwrap().is_empty());

        set.add("one".to_string(), Some(&writer)).unwrap();
        let two = set.add("two".to_string(), Some(&writer)).unwrap();
        store.save_mutable(&mut set).await.unwrap();

        assert!(agent.refresh().await.unwrap());
        assert!(watcher.has_changed().unwrap());
        let state = watcher.borrow_and_update().clone().unwrap();
        assert_eq!(state.terminal_ops().cloned().collect::<Vec<_>>(), vec![two]);
        assert_eq!(set.terminal_ops(), state.terminal_ops().cloned().collect::<Vec<_>>());
        assert!(!agent.refresh().await.unwrap());
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn test_spawned_agent_follows_store_events() {
        let (store, keyring) = store();
        let writer = keyring.generate(None);
        let mut set: MutableSet<String> = MutableSet::with_writers([writer.clone()]);
        set.set_id("live");
        let target = store.save_mutable(&mut set).await.unwrap();

        let agent = Arc::new(CausalHistoryAgent::new(store.clone(), target));
        let mut watcher = agent.watch_stored_state();
        let task = agent.clone().spawn(Duration::from_secs(3600));

        let op = set.add("x".to_string(), Some(&writer)).unwrap();
        store.save_mutable(&mut set).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                watcher.changed().await.unwrap();
                let current = watcher.borrow_and_update();
                if current
                    .as_ref()
                    .is_some_and(|state| state.terminal_ops().any(|hash| hash == &op))
                {
                    break;
                }
            }
        })
        .await;
        assert!(seen.is_ok());
        task.abort();
    }

    #[tokio::test]
    async fn test_peer_catches_up_from_packed_ops() {
        let (ours, keyring) = store();
        let writer = keyring.generate(None);
        let mut set: MutableSet<String> = MutableSet::with_writers([writer.clone()]);
        set.set_id("shared");
        let target = ours.save_mutable(&mut set).await.unwrap();
        for word in ["a", "b", "c"] {
            set.add(word.to_string(), Some(&writer)).unwrap();
        }
        ours.save_mutable(&mut set).await.unwrap();

        let (theirs, _) = store();
        let mut copy = set.clone();
        theirs.save(&mut copy).await.unwrap();
        let their_agent = CausalHistoryAgent::new(theirs.clone(), target.clone());
        let our_agent = CausalHistoryAgent::new(ours.clone(), target.clone());

        let our_state = our_agent.get_stored_state().await.unwrap();
        let missing = their_agent.evaluate_remote_state(&our_state).await.unwrap();
        assert_eq!(missing.len(), 1);

        let their_state = their_agent.get_stored_state().await.unwrap();
        let packed = our_agent.pack_missing(&their_state, 64).await.unwrap();
        assert_eq!(packed.root_hashes.len(), 3);
        their_agent.receive_literals(&packed).await.unwrap();

        let mut replica: MutableSet<String> = theirs.load(&target).await.unwrap().unwrap();
        theirs.load_all_changes(&mut replica).await.unwrap();
        assert_eq!(replica.len(), 3);
        assert_eq!(
            their_agent.get_stored_state().await.unwrap().hash(),
            our_agent.get_stored_state().await.unwrap().hash()
        );
    }
}
