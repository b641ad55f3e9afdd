use core::fmt;
use std::{
    collections::HashSet,
    sync::{Condvar, Mutex},
    thread::sleep,
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    btree::page::BTreePageID, error::IndexError, transaction::Transaction,
    types::ConcurrentHashMap, types::IndexResult, utils::HandyRwLock,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub enum Latch {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_latch(&self) -> Latch {
        match self {
            Permission::ReadOnly => Latch::Shared,
            Permission::ReadWrite => Latch::Exclusive,
        }
    }
}

/// The page latch table of one index.
///
/// Latches are short-term page locks keyed by page id and held on
/// behalf of a transaction. A shared latch excludes an exclusive
/// holder; an exclusive latch excludes every other holder. Acquisition
/// is idempotent per transaction, and a lone shared holder may upgrade
/// in place.
pub struct LatchManager {
    s_holders: ConcurrentHashMap<BTreePageID, HashSet<u64>>,
    x_holder: ConcurrentHashMap<BTreePageID, u64>,

    // serializes the check-then-modify sequence of `try_acquire`
    modification_latch: Mutex<()>,
}

impl LatchManager {
    pub fn new() -> Self {
        Self {
            s_holders: ConcurrentHashMap::new(),
            x_holder: ConcurrentHashMap::new(),
            modification_latch: Mutex::new(()),
        }
    }

    /// Block until the latch is granted. Returns an error when the
    /// latch cannot be acquired within the timeout, since a
    /// well-formed caller (descent order root to leaf, sibling under
    /// the parent) never deadlocks.
    pub fn acquire(
        &self,
        tx: &Transaction,
        latch: Latch,
        pid: &BTreePageID,
    ) -> IndexResult {
        let start_time = Instant::now();
        while Instant::now().duration_since(start_time) < ACQUIRE_TIMEOUT {
            if self.try_acquire(tx, latch, pid) {
                return Ok(());
            }

            sleep(ACQUIRE_RETRY_INTERVAL);
        }

        debug!(
            "latch acquisition timeout, tx: {}, latch: {:?}, pid: {:?}, table: {}",
            tx, latch, pid, self,
        );
        Err(IndexError::new("latch acquisition timeout"))
    }

    fn try_acquire(
        &self,
        tx: &Transaction,
        latch: Latch,
        pid: &BTreePageID,
    ) -> bool {
        let _guard = self.modification_latch.lock().unwrap();
        let tx_id = tx.get_id();

        // another transaction holding the exclusive latch blocks both
        // modes
        if let Some(holder) = self.x_holder.get_inner().rl().get(pid) {
            if *holder != tx_id {
                return false;
            }
            // we already hold the page exclusively
            return true;
        }

        match latch {
            Latch::Shared => {
                self.s_holders.alter_value(pid, |holders| {
                    holders.insert(tx_id);
                });
            }
            Latch::Exclusive => {
                // writers exclude readers; a lone shared holder may
                // upgrade
                {
                    let s_holders = self.s_holders.get_inner().rl();
                    if let Some(holders) = s_holders.get(pid) {
                        if holders.iter().any(|id| *id != tx_id) {
                            return false;
                        }
                    }
                }

                self.s_holders.remove(pid);
                self.x_holder.get_inner().wl().insert(*pid, tx_id);
            }
        }

        true
    }

    pub fn release(&self, tx: &Transaction, pid: &BTreePageID) {
        let _guard = self.modification_latch.lock().unwrap();
        let tx_id = tx.get_id();

        {
            let mut s_holders = self.s_holders.get_inner().wl();
            if let Some(holders) = s_holders.get_mut(pid) {
                holders.remove(&tx_id);
                if holders.is_empty() {
                    s_holders.remove(pid);
                }
            }
        }

        {
            let mut x_holder = self.x_holder.get_inner().wl();
            if x_holder.get(pid) == Some(&tx_id) {
                x_holder.remove(pid);
            }
        }
    }

    pub fn holds(&self, tx: &Transaction, pid: &BTreePageID) -> bool {
        let tx_id = tx.get_id();
        if self.x_holder.get_inner().rl().get(pid) == Some(&tx_id) {
            return true;
        }
        self.s_holders
            .get_inner()
            .rl()
            .get(pid)
            .map(|holders| holders.contains(&tx_id))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.s_holders.clear();
        self.x_holder.clear();
    }
}

impl fmt::Display for LatchManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\ns_holders: {".to_string();
        for (pid, holders) in self.s_holders.get_inner().rl().iter() {
            depiction.push_str(&format!(
                "\n\t{} -> {:?},",
                pid.get_short_repr(),
                holders
            ));
        }
        depiction.push_str("\n}\nx_holder: {");
        for (pid, holder) in self.x_holder.get_inner().rl().iter() {
            depiction.push_str(&format!(
                "\n\t{} -> tx_{},",
                pid.get_short_repr(),
                holder
            ));
        }
        depiction.push_str("\n}\n");
        write!(f, "{}", depiction)
    }
}

/// The tree-level latch serializing changes to the root page id.
///
/// Readers share it, writers own it. Release is explicit (not
/// guard-scoped) because the crabbing protocol frees it from deep
/// inside the descent once a safe child is reached.
pub struct TreeLatch {
    // negative: owned by a writer; otherwise the reader count
    state: Mutex<i64>,
    cond: Condvar,
}

impl TreeLatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn acquire(&self, exclusive: bool) {
        let mut state = self.state.lock().unwrap();
        if exclusive {
            while *state != 0 {
                state = self.cond.wait(state).unwrap();
            }
            *state = -1;
        } else {
            while *state < 0 {
                state = self.cond.wait(state).unwrap();
            }
            *state += 1;
        }
    }

    pub fn release(&self, exclusive: bool) {
        let mut state = self.state.lock().unwrap();
        if exclusive {
            debug_assert_eq!(*state, -1);
            *state = 0;
        } else {
            debug_assert!(*state > 0);
            *state -= 1;
        }
        self.cond.notify_all();
    }
}
