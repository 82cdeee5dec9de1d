//! The ready queue: a priority-ordered, stable (FIFO-within-level) intrusive
//! list (spec §4.3).
//!
//! Storage is a singly-linked list threaded through each [`Process`]'s
//! `ready_next` field — the same intrusive-list approach `r3_kernel` uses
//! for its wait queues, scaled down to a plain `Option<usize>` index chain
//! since this core has no generic-list abstraction to reuse across object
//! kinds.

use crate::handle::Table;
use crate::process::Process;

pub struct ReadyQueue {
    head: Option<usize>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The highest-priority ready process without removing it.
    pub fn peek(&self) -> Option<usize> {
        self.head
    }

    /// Insert `pid` after every process with strictly higher effective
    /// priority and before every process with strictly lower effective
    /// priority — i.e. after its peers too, preserving FIFO order within a
    /// priority level.
    pub fn insert<const N: usize>(&mut self, procs: &mut Table<Process, N>, pid: usize) {
        let prio = procs.get(pid).expect("pid in table").effective_priority;

        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let cur_prio = procs.get(c).expect("linked pid in table").effective_priority;
            if cur_prio > prio {
                break;
            }
            prev = Some(c);
            cur = procs.get(c).unwrap().ready_next;
        }

        procs.get_mut(pid).unwrap().ready_next = cur;
        match prev {
            Some(p) => procs.get_mut(p).unwrap().ready_next = Some(pid),
            None => self.head = Some(pid),
        }
    }

    /// Remove `pid` from wherever it sits in the list. Returns whether it
    /// was found (a process not currently ready is a caller bug, but this
    /// stays a plain bool so callers can assert as they see fit).
    pub fn remove<const N: usize>(&mut self, procs: &mut Table<Process, N>, pid: usize) -> bool {
        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            let next = procs.get(c).unwrap().ready_next;
            if c == pid {
                match prev {
                    Some(p) => procs.get_mut(p).unwrap().ready_next = next,
                    None => self.head = next,
                }
                procs.get_mut(c).unwrap().ready_next = None;
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
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessFlags, Rex};
    use crate::magic::MemRegion;

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
        procs.occupy(i, crate::magic::Magic::PROCESS, Process::new(&rex));
        i
    }

    #[test]
    fn fifo_within_priority_level() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut rq = ReadyQueue::new();
        let a = make(&mut procs, 5);
        let b = make(&mut procs, 5);
        let c = make(&mut procs, 5);
        rq.insert(&mut procs, a);
        rq.insert(&mut procs, b);
        rq.insert(&mut procs, c);
        assert_eq!(rq.pop_highest(&mut procs), Some(a));
        assert_eq!(rq.pop_highest(&mut procs), Some(b));
        assert_eq!(rq.pop_highest(&mut procs), Some(c));
    }

    #[test]
    fn higher_priority_jumps_queue() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut rq = ReadyQueue::new();
        let low = make(&mut procs, 5);
        let high = make(&mut procs, 1);
        rq.insert(&mut procs, low);
        rq.insert(&mut procs, high);
        assert_eq!(rq.pop_highest(&mut procs), Some(high));
        assert_eq!(rq.pop_highest(&mut procs), Some(low));
    }

    #[test]
    fn remove_from_middle() {
        let mut procs: Table<Process, 8> = Table::new();
        let mut rq = ReadyQueue::new();
        let a = make(&mut procs, 3);
        let b = make(&mut procs, 3);
        let c = make(&mut procs, 3);
        rq.insert(&mut procs, a);
        rq.insert(&mut procs, b);
        rq.insert(&mut procs, c);
        assert!(rq.remove(&mut procs, b));
        assert_eq!(rq.pop_highest(&mut procs), Some(a));
        assert_eq!(rq.pop_highest(&mut procs), Some(c));
    }
}
