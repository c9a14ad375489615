/*!
 * Hold Table
 *
 * Tracks keys and pointer buttons a client has pressed down. Every accepted
 * "down" arms a timer; if no matching "up" arrives before it fires, the
 * table releases the input itself so nothing is left stuck down.
 *
 * Each identifier owns a slot guarded by its own mutex, so operations on
 * different identifiers never contend while operations on the same one are
 * serialized. Timer tasks carry the slot generation they were armed with and
 * do nothing if that timer was superseded in the meantime.
 *
 * A slot lives in the table only while its input is held. Once its timer is
 * gone (up, expiry or a rejected press) the slot is retired and removed from
 * the map; anyone still waiting on a retired slot looks the identifier up
 * again. Locks are always taken slot first, map second.
 */

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::provider::{ButtonAction, CapabilityProvider, MouseButton};

/// Default time an input may stay held without an "up"
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_secs(30);

/// A holdable input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HoldTarget {
    Key(String),
    Button(MouseButton),
}

impl fmt::Display for HoldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldTarget::Key(key) => write!(f, "key '{}'", key),
            HoldTarget::Button(button) => write!(f, "{} button", button),
        }
    }
}

struct PressTimer {
    deadline: Instant,
    generation: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    timer: Option<PressTimer>,
    /// Removed from the map; must not be armed again
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

#[derive(Default)]
struct SlotMap {
    /// Set once the table has been drained for shutdown
    closed: bool,
    slots: HashMap<HoldTarget, SlotRef>,
}

type SharedSlots = Arc<Mutex<SlotMap>>;

/// Auto-release timers for held keys and buttons.
pub struct HoldTable {
    provider: Arc<dyn CapabilityProvider>,
    timeout: Duration,
    slots: SharedSlots,
}

async fn transition(
    provider: &dyn CapabilityProvider,
    target: &HoldTarget,
    action: ButtonAction,
) -> Result<()> {
    match target {
        HoldTarget::Key(key) => provider.key_action(key, action.into()).await,
        HoldTarget::Button(button) => provider.pointer_button(*button, action).await,
    }
}

/// Mark `slot` retired and drop it from the map if it is still the live
/// entry for `target`. Caller holds the slot lock.
async fn retire(slots: &Mutex<SlotMap>, target: &HoldTarget, slot: &SlotRef, guard: &mut Slot) {
    let mut map = slots.lock().await;
    if map.slots.get(target).is_some_and(|live| Arc::ptr_eq(live, slot)) {
        map.slots.remove(target);
    }
    guard.retired = true;
}

impl HoldTable {
    pub fn new(provider: Arc<dyn CapabilityProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            slots: Arc::new(Mutex::new(SlotMap::default())),
        }
    }

    /// Lock the live slot for `target`, creating it if needed.
    ///
    /// Returns `None` once the table has been closed by [`release_all`].
    ///
    /// [`release_all`]: HoldTable::release_all
    async fn lock_slot(&self, target: &HoldTarget) -> Option<(SlotRef, OwnedMutexGuard<Slot>)> {
        loop {
            let slot = {
                let mut map = self.slots.lock().await;
                if map.closed {
                    return None;
                }
                map.slots.entry(target.clone()).or_default().clone()
            };

            let guard = slot.clone().lock_owned().await;
            if !guard.retired {
                return Some((slot, guard));
            }
        }
    }

    /// Press `target` and (re)arm its auto-release timer.
    ///
    /// A timer already armed for `target` is replaced without a release; the
    /// new timer still guarantees one. If the provider rejects the press the
    /// existing timer is left untouched. Fails without pressing once the
    /// table has been drained.
    pub async fn on_down(&self, target: HoldTarget) -> Result<()> {
        let Some((slot, mut guard)) = self.lock_slot(&target).await else {
            bail!("Shutting down; not holding {}", target);
        };

        if let Err(e) = transition(self.provider.as_ref(), &target, ButtonAction::Down).await {
            if guard.timer.is_none() {
                retire(&self.slots, &target, &slot, &mut guard).await;
            }
            return Err(e);
        }

        if let Some(previous) = guard.timer.take() {
            debug!("Superseding timer for {}", target);
            previous.task.abort();
        }

        guard.generation += 1;
        let generation = guard.generation;
        let deadline = Instant::now() + self.timeout;

        let task = tokio::spawn(expire(
            self.provider.clone(),
            self.slots.clone(),
            slot.clone(),
            target.clone(),
            generation,
            deadline,
        ));

        guard.timer = Some(PressTimer {
            deadline,
            generation,
            task: task.abort_handle(),
        });

        debug!("Holding {} for {:?}", target, self.timeout);
        Ok(())
    }

    /// Cancel the timer for `target` (if any) and release it.
    pub async fn on_up(&self, target: HoldTarget) -> Result<()> {
        let Some((slot, mut guard)) = self.lock_slot(&target).await else {
            return transition(self.provider.as_ref(), &target, ButtonAction::Up).await;
        };

        if let Some(timer) = guard.timer.take() {
            timer.task.abort();
        }
        retire(&self.slots, &target, &slot, &mut guard).await;

        transition(self.provider.as_ref(), &target, ButtonAction::Up).await
    }

    /// Cancel every timer, release every held input and close the table.
    ///
    /// Returns the identifiers that were released. Release failures are
    /// logged and do not stop the drain. Later presses are refused; later
    /// releases still reach the provider.
    pub async fn release_all(&self) -> Vec<HoldTarget> {
        let drained: Vec<(HoldTarget, SlotRef)> = {
            let mut map = self.slots.lock().await;
            map.closed = true;
            map.slots.drain().collect()
        };
        let mut released = Vec::new();

        for (target, slot) in drained {
            let mut guard = slot.lock().await;
            guard.retired = true;
            let Some(timer) = guard.timer.take() else {
                continue;
            };
            timer.task.abort();

            match transition(self.provider.as_ref(), &target, ButtonAction::Up).await {
                Ok(()) => info!("Released {} during drain", target),
                Err(e) => warn!("Failed to release {} during drain: {:#}", target, e),
            }
            released.push(target);
        }

        released
    }

    /// Identifiers with an armed timer, paired with their remaining time.
    pub async fn held(&self) -> Vec<(HoldTarget, Duration)> {
        let slots: Vec<(HoldTarget, SlotRef)> = self
            .slots
            .lock()
            .await
            .slots
            .iter()
            .map(|(target, slot)| (target.clone(), slot.clone()))
            .collect();

        let now = Instant::now();
        let mut held = Vec::new();
        for (target, slot) in slots {
            if let Some(timer) = &slot.lock().await.timer {
                held.push((target, timer.deadline.saturating_duration_since(now)));
            }
        }
        held
    }
}

async fn expire(
    provider: Arc<dyn CapabilityProvider>,
    slots: SharedSlots,
    slot: SlotRef,
    target: HoldTarget,
    generation: u64,
    deadline: Instant,
) {
    tokio::time::sleep_until(deadline).await;

    let mut guard = slot.lock().await;
    match &guard.timer {
        Some(timer) if timer.generation == generation => {
            guard.timer = None;
        }
        _ => return,
    }
    retire(&slots, &target, &slot, &mut guard).await;

    warn!("No release received for {}; auto-releasing", target);
    if let Err(e) = transition(provider.as_ref(), &target, ButtonAction::Up).await {
        warn!("Auto-release of {} failed: {:#}", target, e);
    }
}
