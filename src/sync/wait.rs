//! Shared waiter-list machinery used by mutexes, events, and semaphores
//! (spec §3: "waiter list ordered by effective priority; ties broken FIFO").
//!
//! Structurally identical to [`crate::readyqueue::ReadyQueue`] — same
//! priority-then-FIFO intrusive-list ordering — but threaded through
//! [`Process::waiter_next`] instead of `ready_next`, since a process can be
//! linked into a sync object's waiter list and the timer wheel at the same
//! time (a timed wait) but never into the ready queue while doing so.

use crate::handle::Table;
use crate::process::Process;

#[derive(Default)]
pub struct WaitList {
    head: Option<usize>,
}

impl WaitList {
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn peek_highest(&self) -> Option<usize> {
        self.head
    }

    pub fn insert<const N: usize>(&mut self, procs: &mut Table<Process, N>, pid: usize) {
        let prio = procs.get(pid).expect("pid in table").effective_priority;

        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let cur_prio = procs.get(c).unwrap().effective_priority;
            if cur_prio > prio {
                break;
            }
            prev = Some(c);
            cur = procs.get(c).unwrap().waiter_next;
        }

        procs.get_mut(pid).unwrap().waiter_next = cur;
        match prev {
            Some(p) => procs.get_mut(p).unwrap().waiter_next = Some(pid),
            None => self.head = Some(pid),
        }
    }

    pub fn remove<const N: usize>(&mut self, procs: &mut Table<Process, N>, pid: usize) -> bool {
        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let next = procs.get(c).unwrap().waiter_next;
            if c == pid {
                match prev {
                    Some(p) => procs.get_mut(p).unwrap().waiter_next = next,
                    None => self.head = next,
                }
                procs.get_mut(c).unwrap().waiter_next = None;
                return true;
            }
            prev = Some(c);
            cur = next;
        }
        false
    }

    pub fn pop_highest<const N: usize>(&mut self, procs: &mut Table<Process, N>) -> Option<usize> {
        let head = self.head?;
        self.remove(procs, head);
        Some(head)
    }

    /// The effective priority of the highest-priority waiter, if any. Used
    /// to recompute a mutex owner's inherited priority (spec §4.5).
    pub fn highest_priority<const N: usize>(&self, procs: &Table<Process, N>) -> Option<u8> {
        self.head.map(|h| procs.get(h).unwrap().effective_priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magic::{Magic, MemRegion};
    use crate::process::{ProcessFlags, Rex};

    fn make(procs: &mut Table<Process, 8>, prio: u8) -> usize {
        let rex = Rex {
            name: "p",
            stack_size: 256,
            priority: prio,
            flags: ProcessFlags::ACTIVE,
            entry_point: 0,
            arena: MemRegion::new(0x1000, 0x100),
        };
        let i = procs.alloc().unwrap();
        procs.occupy(i, Magic::PROCESS, Process::new(&rex));
        i
    }

    #[test]
    fn fifo_within_priority_level() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut wl = WaitList::new();
        let a = make(&mut procs, 4);
        let b = make(&mut procs, 4);
        wl.insert(&mut procs, a);
        wl.insert(&mut procs, b);
        assert_eq!(wl.pop_highest(&mut procs), Some(a));
        assert_eq!(wl.pop_highest(&mut procs), Some(b));
        assert!(wl.is_empty());
    }

    #[test]
    fn higher_priority_jumps_list() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut wl = WaitList::new();
        let low = make(&mut procs, 5);
        let high = make(&mut procs, 1);
        wl.insert(&mut procs, low);
        wl.insert(&mut procs, high);
        assert_eq!(wl.highest_priority(&procs), Some(1));
        assert_eq!(wl.pop_highest(&mut procs), Some(high));
    }

    #[test]
    fn remove_unlinks_without_disturbing_others() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut wl = WaitList::new();
        let a = make(&mut procs, 3);
        let b = make(&mut procs, 3);
        let c = make(&mut procs, 3);
        wl.insert(&mut procs, a);
        wl.insert(&mut procs, b);
        wl.insert(&mut procs, c);
        assert!(wl.remove(&mut procs, b));
        assert!(!wl.remove(&mut procs, b));
        assert_eq!(wl.pop_highest(&mut procs), Some(a));
        assert_eq!(wl.pop_highest(&mut procs), Some(c));
    }
}
