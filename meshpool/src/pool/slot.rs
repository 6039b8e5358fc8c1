//! # Slot Table & Status Tracker
//!
//! Thread-safe bookkeeping of which instances exist and their current
//! status. The table is the pool's single serialization point: every
//! mutation goes through one pool-wide mutex, and no operation blocks
//! while holding it.
//!
//! ## Index stability
//! Slot indices are assigned at creation and never reused. Removed slots
//! are tombstoned (`Retired`), not shifted, so external references by
//! index stay valid for the pool's lifetime.
//!
//! ## State machine
//! `Spawning -> Free -> {Busy <-> Free}`, `Free/Busy -> Locked -> Free`,
//! any non-terminal -> `Dead` -> `Spawning` (healing) or `Retired`
//! (removal). `Exiting` brackets tear-down; `Retired` is terminal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Notify;
use tracing::trace;

use meshpool_api::Instance;

use crate::pool::error::PoolError;

/// Status of a single slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// An instance is being launched for this slot.
    Spawning,

    /// The instance is idle and available for dispatch.
    Free,

    /// The instance is executing one dispatched job.
    Busy,

    /// The instance is reserved by a caller for a sequence of dependent
    /// calls. Locked slots are under exclusive external control; the
    /// health monitor does not probe them.
    Locked,

    /// The instance is unreachable. Excluded from dispatch until healed.
    Dead,

    /// The instance is being torn down.
    Exiting,

    /// The slot has been removed. Terminal; the index is never reused.
    Retired,
}

impl SlotStatus {
    /// Whether a transition from `self` to `to` is allowed by the slot
    /// state machine.
    pub fn can_transition(self, to: SlotStatus) -> bool {
        use SlotStatus::*;
        match (self, to) {
            (a, b) if a == b => false,
            (Retired, _) => false,
            (_, Retired) => true,
            (Exiting, _) => false,
            (_, Exiting) => true,
            (Dead, Spawning) => true,
            (Dead, _) => false,
            (_, Dead) => true,
            (Spawning, Free) => true,
            (Free, Busy) => true,
            (Busy, Free) => true,
            (Free, Locked) => true,
            (Busy, Locked) => true,
            (Locked, Free) => true,
            _ => false,
        }
    }

    /// Whether the slot counts toward the reported pool size.
    pub fn is_live(self) -> bool {
        !matches!(self, SlotStatus::Dead | SlotStatus::Retired)
    }
}

/// Opaque reference to one running instance: its connection, address,
/// working directory, and the slot index it occupies.
///
/// Owned exclusively by its slot-table entry; the connection is closed
/// exactly once, on removal or pool shutdown.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    /// Slot index. Stable for the pool's lifetime.
    pub index: usize,

    /// Address the instance is reachable at.
    pub addr: SocketAddr,

    /// The underlying connection.
    pub connection: Arc<dyn Instance>,

    /// Isolated working directory for this instance.
    pub work_dir: PathBuf,

    /// When the instance reported ready.
    pub created_at: Instant,
}

/// One slot's record.
#[derive(Debug)]
struct Slot {
    status: SlotStatus,
    handle: Option<InstanceHandle>,
    last_health_check: Option<Instant>,
    busy_since: Option<Instant>,
    heal_attempts: u32,
}

impl Slot {
    fn new() -> Self {
        Self {
            status: SlotStatus::Spawning,
            handle: None,
            last_health_check: None,
            busy_since: None,
            heal_attempts: 0,
        }
    }
}

#[derive(Debug, Default)]
struct TableInner {
    slots: Vec<Slot>,
    spawning_count: usize,
    exiting_count: usize,
}

/// The pool's ordered, index-addressable collection of slots.
///
/// # Thread Safety
/// - All mutation goes through one internal mutex
/// - The mutex is never held across an await point
/// - `Notify` wakes dispatchers when a slot becomes free
#[derive(Debug)]
pub struct SlotTable {
    inner: Mutex<TableInner>,
    free_notify: Notify,
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            free_notify: Notify::new(),
        }
    }

    /// Reserve the next unused index. Always appends; tombstoned indices
    /// are never reused, to avoid aliasing with a job still referencing
    /// them. The new slot starts `Spawning`.
    pub fn allocate(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.push(Slot::new());
        let index = inner.slots.len() - 1;
        trace!(index, "slot allocated");
        index
    }

    /// Transition a slot's status, validating against the state machine.
    pub fn set_status(&self, index: usize, to: SlotStatus) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().unwrap();
        Self::transition(&mut inner, index, to)?;
        drop(inner);
        if to == SlotStatus::Free {
            self.free_notify.notify_waiters();
        }
        Ok(())
    }

    fn transition(inner: &mut TableInner, index: usize, to: SlotStatus) -> Result<(), PoolError> {
        let slot = inner
            .slots
            .get_mut(index)
            .ok_or(PoolError::IndexOutOfRange(index))?;
        let from = slot.status;
        if !from.can_transition(to) {
            return Err(PoolError::InvalidTransition { index, from, to });
        }
        slot.status = to;
        slot.busy_since = if to == SlotStatus::Busy {
            Some(Instant::now())
        } else {
            None
        };
        trace!(index, ?from, ?to, "slot transition");
        Ok(())
    }

    /// Atomically find a `Free` slot and flip it to `Busy`. O(slots).
    ///
    /// Returns the slot index and a clone of its handle, or `None` when
    /// nothing is free (the caller polls or waits on [`free_notify`]).
    ///
    /// [`free_notify`]: SlotTable::free_notify
    pub fn try_acquire_free(&self) -> Option<(usize, InstanceHandle)> {
        let mut inner = self.inner.lock().unwrap();
        for index in 0..inner.slots.len() {
            if inner.slots[index].status == SlotStatus::Free && inner.slots[index].handle.is_some()
            {
                inner.slots[index].status = SlotStatus::Busy;
                inner.slots[index].busy_since = Some(Instant::now());
                let handle = inner.slots[index].handle.clone().unwrap();
                trace!(index, "slot acquired for dispatch");
                return Some((index, handle));
            }
        }
        None
    }

    /// Notification handle dispatchers wait on for a slot to become free.
    pub fn free_notify(&self) -> &Notify {
        &self.free_notify
    }

    /// Release a slot held `Busy` by a finished job.
    ///
    /// Returns `false` when the slot was forcibly removed mid-flight, in
    /// which case the job's outcome is recorded as cancelled. A slot the
    /// monitor marked `Dead` while the job ran stays `Dead`.
    pub fn release_busy(&self, index: usize, next: SlotStatus) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(slot) = inner.slots.get_mut(index) else {
            return false;
        };
        match slot.status {
            SlotStatus::Busy => {
                let _ = Self::transition(&mut inner, index, next);
                drop(inner);
                if next == SlotStatus::Free {
                    self.free_notify.notify_waiters();
                }
                true
            }
            // health monitor declared it dead while the job ran
            SlotStatus::Dead => true,
            // force-removed mid-flight
            SlotStatus::Exiting | SlotStatus::Retired => false,
            _ => true,
        }
    }

    /// Attach a freshly spawned handle to its slot.
    pub fn attach_handle(&self, index: usize, handle: InstanceHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.handle = Some(handle);
        }
    }

    /// Clone of the handle at `index`, if one is attached.
    pub fn handle(&self, index: usize) -> Option<InstanceHandle> {
        let inner = self.inner.lock().unwrap();
        inner.slots.get(index).and_then(|s| s.handle.clone())
    }

    /// Current status of the slot at `index`.
    pub fn status(&self, index: usize) -> Result<SlotStatus, PoolError> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .get(index)
            .map(|s| s.status)
            .ok_or(PoolError::IndexOutOfRange(index))
    }

    /// Consistent ordered read of every slot's status, tombstones
    /// included.
    pub fn snapshot(&self) -> Vec<(usize, SlotStatus)> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.status))
            .collect()
    }

    /// Number of live slots (status not `Dead` or `Retired`).
    pub fn live_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.slots.iter().filter(|s| s.status.is_live()).count()
    }

    /// Number of slots a dispatcher could eventually run a job on.
    pub fn dispatchable_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .filter(|s| {
                matches!(
                    s.status,
                    SlotStatus::Free | SlotStatus::Busy | SlotStatus::Locked | SlotStatus::Spawning
                )
            })
            .count()
    }

    /// Number of slots currently executing or reserved.
    pub fn busy_or_locked_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .filter(|s| matches!(s.status, SlotStatus::Busy | SlotStatus::Locked))
            .count()
    }

    /// Ports bound by sibling slots, for free-port selection.
    pub fn ports_in_use(&self) -> Vec<u16> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .filter(|s| s.status != SlotStatus::Retired)
            .filter_map(|s| s.handle.as_ref().map(|h| h.addr.port()))
            .collect()
    }

    /// Live handles, for iteration and bulk termination.
    pub fn live_handles(&self) -> Vec<(usize, InstanceHandle)> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.is_live())
            .filter_map(|(i, s)| s.handle.clone().map(|h| (i, h)))
            .collect()
    }

    // --- resize counters ---

    pub fn inc_spawning(&self) {
        self.inner.lock().unwrap().spawning_count += 1;
    }

    pub fn dec_spawning(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.spawning_count = inner.spawning_count.saturating_sub(1);
    }

    pub fn inc_exiting(&self) {
        self.inner.lock().unwrap().exiting_count += 1;
    }

    pub fn dec_exiting(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.exiting_count = inner.exiting_count.saturating_sub(1);
    }

    /// `(spawning_count, exiting_count)`. Quiescence is `(0, 0)`.
    pub fn counters(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.spawning_count, inner.exiting_count)
    }

    // --- caller-held exclusivity (Locked) ---

    /// Reserve the slot at `index` for exclusive caller use
    /// (`Free -> Locked`).
    pub fn lock_slot(&self, index: usize) -> Result<InstanceHandle, PoolError> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .slots
            .get(index)
            .ok_or(PoolError::IndexOutOfRange(index))?;
        if slot.status == SlotStatus::Retired {
            return Err(PoolError::IndexOutOfRange(index));
        }
        if slot.status != SlotStatus::Free {
            return Err(PoolError::InstanceBusy {
                index,
                status: slot.status,
            });
        }
        let handle = slot
            .handle
            .clone()
            .ok_or_else(|| anyhow::anyhow!("free slot {index} has no handle"))?;
        Self::transition(&mut inner, index, SlotStatus::Locked)?;
        Ok(handle)
    }

    /// Reserve any free slot for exclusive caller use.
    pub fn try_lock_any(&self) -> Option<(usize, InstanceHandle)> {
        let mut inner = self.inner.lock().unwrap();
        for index in 0..inner.slots.len() {
            if inner.slots[index].status == SlotStatus::Free && inner.slots[index].handle.is_some()
            {
                inner.slots[index].status = SlotStatus::Locked;
                let handle = inner.slots[index].handle.clone().unwrap();
                return Some((index, handle));
            }
        }
        None
    }

    /// Release a caller-held reservation (`Locked -> Free`). A no-op if
    /// the slot moved on (removed or died) while it was held.
    pub fn release_locked(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        let released = match inner.slots.get(index) {
            Some(slot) if slot.status == SlotStatus::Locked => {
                Self::transition(&mut inner, index, SlotStatus::Free).is_ok()
            }
            _ => false,
        };
        drop(inner);
        if released {
            self.free_notify.notify_waiters();
        }
    }

    // --- removal ---

    /// Start removing the slot at `index`: validate, flip to `Exiting`,
    /// take the handle out, and bump `exiting_count`.
    ///
    /// Without `force`, a `Busy` or `Locked` slot is refused: removal
    /// must not silently discard in-flight work.
    pub fn begin_remove(
        &self,
        index: usize,
        force: bool,
    ) -> Result<Option<InstanceHandle>, PoolError> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .slots
            .get(index)
            .ok_or(PoolError::IndexOutOfRange(index))?;
        if slot.status == SlotStatus::Retired {
            return Err(PoolError::IndexOutOfRange(index));
        }
        if !force && matches!(slot.status, SlotStatus::Busy | SlotStatus::Locked) {
            return Err(PoolError::InstanceBusy {
                index,
                status: slot.status,
            });
        }
        Self::transition(&mut inner, index, SlotStatus::Exiting)?;
        inner.exiting_count += 1;
        Ok(inner.slots[index].handle.take())
    }

    /// Finish a removal: tombstone the slot and drop `exiting_count`.
    /// The slot is tombstoned regardless of how termination went, since a
    /// removed instance must never remain schedulable.
    pub fn finish_remove(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        let _ = Self::transition(&mut inner, index, SlotStatus::Retired);
        inner.exiting_count = inner.exiting_count.saturating_sub(1);
    }

    // --- health monitoring & healing ---

    /// Slots eligible for a liveness probe, with their connections.
    /// Locked slots are under exclusive external control and are skipped;
    /// so are slots with no handle attached.
    pub fn probe_targets(&self) -> Vec<(usize, SlotStatus, Arc<dyn Instance>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.status, SlotStatus::Free | SlotStatus::Busy))
            .filter_map(|(i, s)| {
                s.handle
                    .as_ref()
                    .map(|h| (i, s.status, h.connection.clone()))
            })
            .collect()
    }

    /// Mark the slot `Dead` only if its status is still `expected`.
    /// Returns whether the transition was applied.
    pub fn mark_dead_if(&self, index: usize, expected: SlotStatus) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.slots.get(index) {
            Some(slot) if slot.status == expected => {
                Self::transition(&mut inner, index, SlotStatus::Dead).is_ok()
            }
            _ => false,
        }
    }

    /// Record a successful probe.
    pub fn note_health_check(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.last_health_check = Some(Instant::now());
        }
    }

    /// Dead slots that have not yet exhausted their respawn budget.
    pub fn healable_slots(&self, max_attempts: u32) -> Vec<usize> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == SlotStatus::Dead && s.heal_attempts < max_attempts)
            .map(|(i, _)| i)
            .collect()
    }

    /// Start healing a dead slot: `Dead -> Spawning` at the same index,
    /// bump the attempt counter and `spawning_count`, and take the stale
    /// handle out for tear-down. Returns `None` if the slot is no longer
    /// eligible.
    pub fn begin_heal(&self, index: usize, max_attempts: u32) -> Option<Option<InstanceHandle>> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.slots.get(index)?;
        if slot.status != SlotStatus::Dead || slot.heal_attempts >= max_attempts {
            return None;
        }
        Self::transition(&mut inner, index, SlotStatus::Spawning).ok()?;
        let slot = &mut inner.slots[index];
        slot.heal_attempts += 1;
        let stale = slot.handle.take();
        inner.spawning_count += 1;
        Some(stale)
    }

    /// Complete a heal: attach the replacement and restore the slot to
    /// `Free`. Returns `false` when the slot moved on (removed) while the
    /// replacement was launching; the caller must tear the replacement
    /// down.
    pub fn finish_heal_success(&self, index: usize, handle: InstanceHandle) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.spawning_count = inner.spawning_count.saturating_sub(1);
        let restored = Self::transition(&mut inner, index, SlotStatus::Free).is_ok();
        if restored {
            if let Some(slot) = inner.slots.get_mut(index) {
                slot.handle = Some(handle);
                slot.heal_attempts = 0;
            }
        }
        drop(inner);
        if restored {
            self.free_notify.notify_waiters();
        }
        restored
    }

    /// Record a failed heal attempt: back to `Dead`, excluded from
    /// dispatch.
    pub fn finish_heal_failure(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        let _ = Self::transition(&mut inner, index, SlotStatus::Dead);
        inner.spawning_count = inner.spawning_count.saturating_sub(1);
    }

    // --- shutdown ---

    /// Flip every live slot to `Exiting` and take its handle out, for
    /// bulk termination.
    pub fn drain_for_shutdown(&self) -> Vec<(usize, InstanceHandle)> {
        let mut inner = self.inner.lock().unwrap();
        let mut drained = Vec::new();
        for index in 0..inner.slots.len() {
            if inner.slots[index].status != SlotStatus::Retired {
                let _ = Self::transition(&mut inner, index, SlotStatus::Exiting);
                if let Some(handle) = inner.slots[index].handle.take() {
                    drained.push((index, handle));
                }
            }
        }
        drained
    }

    /// Tombstone every remaining slot.
    pub fn retire_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for index in 0..inner.slots.len() {
            if inner.slots[index].status != SlotStatus::Retired {
                let _ = Self::transition(&mut inner, index, SlotStatus::Retired);
            }
        }
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[derive(Debug)]
    struct NullInstance(SocketAddr);

    #[async_trait::async_trait]
    impl Instance for NullInstance {
        fn address(&self) -> SocketAddr {
            self.0
        }
        async fn ping(&self) -> bool {
            true
        }
        async fn submit(&self, input: &str) -> Result<String, meshpool_api::JobError> {
            Ok(input.to_string())
        }
        async fn terminate(&self) -> Result<(), meshpool_api::TerminateError> {
            Ok(())
        }
        async fn kill(&self) {}
    }

    fn handle(index: usize, port: u16) -> InstanceHandle {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        InstanceHandle {
            index,
            addr,
            connection: Arc::new(NullInstance(addr)),
            work_dir: std::env::temp_dir(),
            created_at: Instant::now(),
        }
    }

    fn ready_slot(table: &SlotTable, port: u16) -> usize {
        let index = table.allocate();
        table.attach_handle(index, handle(index, port));
        table.set_status(index, SlotStatus::Free).unwrap();
        index
    }

    #[test]
    fn allocation_always_appends() {
        let table = SlotTable::new();
        assert_eq!(table.allocate(), 0);
        assert_eq!(table.allocate(), 1);
        let handle = table.begin_remove(0, false).unwrap();
        assert!(handle.is_none());
        table.finish_remove(0);
        // a retired index is never handed out again
        assert_eq!(table.allocate(), 2);
    }

    #[test]
    fn transition_rules_hold() {
        use SlotStatus::*;
        assert!(Spawning.can_transition(Free));
        assert!(Free.can_transition(Busy));
        assert!(Busy.can_transition(Free));
        assert!(Free.can_transition(Locked));
        assert!(Locked.can_transition(Free));
        assert!(Busy.can_transition(Dead));
        assert!(Dead.can_transition(Spawning));
        assert!(Dead.can_transition(Retired));

        assert!(!Dead.can_transition(Busy));
        assert!(!Dead.can_transition(Free));
        assert!(!Retired.can_transition(Free));
        assert!(!Retired.can_transition(Spawning));
        assert!(!Spawning.can_transition(Busy));
        assert!(!Locked.can_transition(Busy));
        assert!(!Free.can_transition(Free));
    }

    #[test]
    fn invalid_transition_is_reported() {
        let table = SlotTable::new();
        let index = table.allocate();
        let err = table.set_status(index, SlotStatus::Busy).unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidTransition {
                from: SlotStatus::Spawning,
                to: SlotStatus::Busy,
                ..
            }
        ));
    }

    #[test]
    fn acquire_flips_exactly_one_slot() {
        let table = SlotTable::new();
        ready_slot(&table, 50052);
        ready_slot(&table, 50053);

        let (first, _) = table.try_acquire_free().unwrap();
        let (second, _) = table.try_acquire_free().unwrap();
        assert_ne!(first, second);
        assert!(table.try_acquire_free().is_none());

        assert!(table.release_busy(first, SlotStatus::Free));
        let (again, _) = table.try_acquire_free().unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn release_after_force_remove_reports_cancelled() {
        let table = SlotTable::new();
        let index = ready_slot(&table, 50052);
        let (acquired, _) = table.try_acquire_free().unwrap();
        assert_eq!(acquired, index);

        // force removal mid-flight
        let handle = table.begin_remove(index, true).unwrap();
        assert!(handle.is_some());
        table.finish_remove(index);

        assert!(!table.release_busy(index, SlotStatus::Free));
        assert_eq!(table.status(index).unwrap(), SlotStatus::Retired);
    }

    #[test]
    fn busy_slot_refuses_removal_without_force() {
        let table = SlotTable::new();
        let index = ready_slot(&table, 50052);
        table.try_acquire_free().unwrap();

        let err = table.begin_remove(index, false).unwrap_err();
        assert!(matches!(err, PoolError::InstanceBusy { .. }));
        assert_eq!(table.status(index).unwrap(), SlotStatus::Busy);
    }

    #[test]
    fn counters_track_resize_operations() {
        let table = SlotTable::new();
        assert_eq!(table.counters(), (0, 0));
        table.inc_spawning();
        table.inc_exiting();
        assert_eq!(table.counters(), (1, 1));
        table.dec_spawning();
        table.dec_exiting();
        assert_eq!(table.counters(), (0, 0));
    }

    #[test]
    fn locked_slots_are_not_probe_targets() {
        let table = SlotTable::new();
        let a = ready_slot(&table, 50052);
        let b = ready_slot(&table, 50053);
        table.lock_slot(b).unwrap();

        let targets = table.probe_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, a);

        table.release_locked(b);
        assert_eq!(table.probe_targets().len(), 2);
    }

    #[test]
    fn heal_cycle_reuses_the_index() {
        let table = SlotTable::new();
        let index = ready_slot(&table, 50052);
        assert!(table.mark_dead_if(index, SlotStatus::Free));

        assert_eq!(table.healable_slots(3), vec![index]);
        let stale = table.begin_heal(index, 3).unwrap();
        assert!(stale.is_some());
        assert_eq!(table.status(index).unwrap(), SlotStatus::Spawning);
        assert_eq!(table.counters().0, 1);

        assert!(table.finish_heal_success(index, handle(index, 50060)));
        assert_eq!(table.status(index).unwrap(), SlotStatus::Free);
        assert_eq!(table.counters().0, 0);
    }

    #[test]
    fn heal_budget_is_bounded() {
        let table = SlotTable::new();
        let index = ready_slot(&table, 50052);
        assert!(table.mark_dead_if(index, SlotStatus::Free));

        for _ in 0..2 {
            table.begin_heal(index, 2).unwrap();
            table.finish_heal_failure(index);
        }
        assert!(table.begin_heal(index, 2).is_none());
        assert!(table.healable_slots(2).is_empty());
        assert_eq!(table.status(index).unwrap(), SlotStatus::Dead);
    }

    #[test]
    fn live_len_excludes_dead_and_retired() {
        let table = SlotTable::new();
        let a = ready_slot(&table, 50052);
        ready_slot(&table, 50053);
        let c = ready_slot(&table, 50054);
        assert_eq!(table.live_len(), 3);

        table.mark_dead_if(a, SlotStatus::Free);
        assert_eq!(table.live_len(), 2);

        table.begin_remove(c, false).unwrap();
        table.finish_remove(c);
        assert_eq!(table.live_len(), 1);
    }
}
