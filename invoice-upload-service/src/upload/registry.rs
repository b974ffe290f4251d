//! Authoritative store for the items of the active batch.
//!
//! Every mutation swaps in a new immutable [`RegistrySnapshot`], so readers always
//! see whole items and never a half-applied update. Subscribers are woken through a
//! version counter after each effective change.
//!
//! `initialize` and `clear` start a new epoch. Pipelines write through the
//! `*_in` variants with the epoch they started in, so a pipeline left over from an
//! abandoned batch can never touch the items of the next one.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::types::{ItemUpdate, UploadItem, UploadStatus};

/// Immutable view of the registry at one point in time
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub epoch: u64,
    pub items: Vec<UploadItem>,
}

impl RegistrySnapshot {
    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

pub struct ItemRegistry {
    state: ArcSwap<RegistrySnapshot>,
    version: watch::Sender<u64>,
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: ArcSwap::from_pointee(RegistrySnapshot::default()),
            version,
        }
    }

    /// Replace the registry wholesale; every item starts `pending` at 0%.
    ///
    /// Returns the new epoch.
    pub fn initialize(&self, items: Vec<UploadItem>) -> u64 {
        let items: Vec<UploadItem> = items
            .into_iter()
            .map(|mut item| {
                item.reset();
                item
            })
            .collect();
        let count = items.len();
        let epoch = self.replace(items);
        debug!(count, epoch, "Registry initialized");
        epoch
    }

    /// Merge `change` into the item with `id` while the registry is still in `epoch`.
    ///
    /// Unknown ids and status changes outside the item lifecycle are ignored.
    pub fn update_in(&self, epoch: u64, id: &str, change: &ItemUpdate) -> bool {
        self.modify_item(Some(epoch), id, |item| apply_checked(item, change))
    }

    /// Apply `change` only while the item's status satisfies `allowed`.
    pub fn update_if(
        &self,
        id: &str,
        allowed: impl Fn(UploadStatus) -> bool,
        change: &ItemUpdate,
    ) -> bool {
        self.modify_item(None, id, |item| {
            if !allowed(item.status) {
                return false;
            }
            apply_checked(item, change)
        })
    }

    /// Record upload progress reported by the transport.
    ///
    /// Reports may arrive duplicated or out of order; progress only ever moves
    /// forward and is ignored once the item has left `uploading`.
    pub fn record_progress_in(&self, epoch: u64, id: &str, percent: u8) -> bool {
        let percent = percent.min(100);
        self.modify_item(Some(epoch), id, |item| {
            if item.status != UploadStatus::Uploading || percent <= item.progress {
                return false;
            }
            item.progress = percent;
            true
        })
    }

    /// Reset a failed item for retry; returns its fresh state and the current epoch.
    ///
    /// Only `error` items are reset, which keeps a single pipeline in charge of
    /// any item even when retries race each other.
    pub fn reset_for_retry(&self, id: &str) -> Option<(UploadItem, u64)> {
        let mut reset = None;
        self.modify(None, |state| {
            // rcu may rerun this closure; only the attempt that lands counts
            reset = None;
            let epoch = state.epoch;
            match state.items.iter_mut().find(|item| item.id == id) {
                Some(item) if item.status == UploadStatus::Error => {
                    item.reset();
                    reset = Some((item.clone(), epoch));
                    true
                }
                _ => false,
            }
        });
        reset
    }

    pub fn remove(&self, id: &str) -> bool {
        self.modify(None, |state| {
            let before = state.items.len();
            state.items.retain(|item| item.id != id);
            state.items.len() != before
        })
    }

    /// Empty the registry, starting a new epoch
    pub fn clear(&self) {
        let epoch = self.replace(Vec::new());
        debug!(epoch, "Registry cleared");
    }

    pub fn get(&self, id: &str) -> Option<UploadItem> {
        self.state.load().get(id).cloned()
    }

    /// Item with `id`, provided the registry is still in `epoch`
    pub fn get_in(&self, epoch: u64, id: &str) -> Option<UploadItem> {
        let state = self.state.load();
        if state.epoch != epoch {
            return None;
        }
        state.get(id).cloned()
    }

    /// Current immutable snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.state.load_full()
    }

    /// Receiver that ticks after every effective change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Wake subscribers without changing items (e.g. run state changed)
    pub fn notify(&self) {
        self.version.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn replace(&self, items: Vec<UploadItem>) -> u64 {
        let previous = self.state.rcu(|current| RegistrySnapshot {
            epoch: current.epoch + 1,
            items: items.clone(),
        });
        self.notify();
        previous.epoch + 1
    }

    fn modify_item(
        &self,
        epoch: Option<u64>,
        id: &str,
        mut f: impl FnMut(&mut UploadItem) -> bool,
    ) -> bool {
        self.modify(epoch, |state| {
            match state.items.iter_mut().find(|item| item.id == id) {
                Some(item) => f(item),
                None => false,
            }
        })
    }

    fn modify(
        &self,
        epoch: Option<u64>,
        mut f: impl FnMut(&mut RegistrySnapshot) -> bool,
    ) -> bool {
        let mut changed = false;
        self.state.rcu(|current| {
            if epoch.is_some_and(|epoch| epoch != current.epoch) {
                changed = false;
                return Arc::clone(current);
            }
            let mut next = RegistrySnapshot::clone(current);
            changed = f(&mut next);
            if changed {
                Arc::new(next)
            } else {
                Arc::clone(current)
            }
        });
        if changed {
            self.notify();
        }
        changed
    }
}

fn apply_checked(item: &mut UploadItem, change: &ItemUpdate) -> bool {
    if let Some(next) = change.status
        && next != item.status
        && !item.status.can_transition_to(next)
    {
        warn!(
            item_id = %item.id,
            from = %item.status,
            to = %next,
            "Ignoring invalid status transition"
        );
        return false;
    }
    change.apply(item);
    true
}
