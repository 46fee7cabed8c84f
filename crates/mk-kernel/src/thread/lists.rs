//! Intrusive doubly linked lists over an arena of thread control blocks,
//! addressed by stable handles rather than raw pointers (see DESIGN.md's
//! note on node ownership). A node belongs to at most one list at a time;
//! which one is recorded in its own [`ListTag`] so that removing a node
//! that is not a member of the list in question is a safe no-op.

use crate::thread::tcb::ThreadControlBlock;
use crate::types::ThreadHandle;
use std::collections::BTreeMap;

pub type ThreadArena = BTreeMap<ThreadHandle, ThreadControlBlock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTag {
    Scheduler,
    WaitingOn(ThreadHandle),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListLinks {
    pub prev: Option<ThreadHandle>,
    pub next: Option<ThreadHandle>,
    pub tag: Option<ListTag>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadList {
    head: Option<ThreadHandle>,
    tail: Option<ThreadHandle>,
}

impl ThreadList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn peek_front(&self) -> Option<ThreadHandle> {
        self.head
    }

    /// Appends `handle` to the tail of this list, tagging it as a member.
    pub fn insert<F>(&mut self, arena: &mut ThreadArena, handle: ThreadHandle, tag: ListTag, mut links: F)
    where
        F: FnMut(&mut ThreadControlBlock) -> &mut ListLinks,
    {
        let prev = self.tail;
        if let Some(tail) = self.tail {
            links(arena.get_mut(&tail).expect("list tail must exist")).next = Some(handle);
        } else {
            self.head = Some(handle);
        }
        {
            let node = links(arena.get_mut(&handle).expect("inserted node must exist"));
            node.prev = prev;
            node.next = None;
            node.tag = Some(tag);
        }
        self.tail = Some(handle);
    }

    /// Unlinks `handle`. A no-op (returns `false`) if `handle` is not
    /// currently tagged as a member of this list.
    pub fn remove<F>(&mut self, arena: &mut ThreadArena, handle: ThreadHandle, mut links: F) -> bool
    where
        F: FnMut(&mut ThreadControlBlock) -> &mut ListLinks,
    {
        let (prev, next) = {
            let Some(tcb) = arena.get_mut(&handle) else {
                return false;
            };
            let node = links(tcb);
            if node.tag.is_none() {
                return false;
            }
            let prev = node.prev;
            let next = node.next;
            node.prev = None;
            node.next = None;
            node.tag = None;
            (prev, next)
        };

        match prev {
            Some(p) => links(arena.get_mut(&p).expect("prev node must exist")).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => links(arena.get_mut(&n).expect("next node must exist")).prev = prev,
            None => self.tail = prev,
        }
        true
    }

    pub fn pop_front<F>(&mut self, arena: &mut ThreadArena, mut links: F) -> Option<ThreadHandle>
    where
        F: FnMut(&mut ThreadControlBlock) -> &mut ListLinks,
    {
        let head = self.head?;
        self.remove(arena, head, &mut links);
        Some(head)
    }
}
