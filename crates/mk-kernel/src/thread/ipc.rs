//! Rendezvous and bounded-async IPC (C7), implemented as an `impl` block
//! on [`ThreadManager`] since every operation needs the same arena access
//! the scheduler does.

use super::{ThreadManager, ThreadState};
use crate::error::SyscallError;
use crate::message::Message;
use crate::thread::lists::ListTag;
use crate::types::ThreadHandle;

impl ThreadManager {
    /// `send(to, msg)`. If `to` is already blocked receiving from `sender`
    /// (or from anyone), the rendezvous completes immediately and `msg` is
    /// copied into `to`'s inbox. Otherwise `sender` blocks in
    /// `BlockedSend(to)`, queued on `to`'s inbox.
    pub fn send(
        &mut self,
        sender: ThreadHandle,
        to: ThreadHandle,
        msg: Message,
    ) -> Result<SendOutcome, SyscallError> {
        let to_state = self.get(to).map(|t| t.state).ok_or(SyscallError::InvalidArgument)?;

        let matches = match to_state {
            ThreadState::BlockedRecv(None) => true,
            ThreadState::BlockedRecv(Some(from)) => from == sender,
            _ => false,
        };

        if matches {
            let mut delivered = msg;
            delivered.sender = sender.val();
            if let Some(tcb) = self.get_mut(to) {
                tcb.pending_message = Some(delivered);
                tcb.state = ThreadState::Ready;
            }
            self.scheduler.add_thread(&mut self.threads, to);
            return Ok(SendOutcome::Delivered);
        }

        if let Some(tcb) = self.get_mut(sender) {
            tcb.state = ThreadState::BlockedSend(to);
            tcb.pending_message = Some(msg);
        }
        self.with_waiting_list(to, |list, arena| {
            list.insert(arena, sender, ListTag::WaitingOn(to), |t| &mut t.wait_links);
        });
        self.scheduler.stop(&mut self.threads, sender);
        Ok(SendOutcome::Blocked)
    }

    /// `recv(from)`. `from == None` matches the first already-waiting
    /// sender, FIFO; `Some(peer)` matches only that sender. If no match is
    /// waiting, the receiver blocks in `BlockedRecv`.
    pub fn recv(&mut self, receiver: ThreadHandle, from: Option<ThreadHandle>) -> RecvOutcome {
        let candidate = match from {
            Some(peer) => {
                let waiting_on_us = matches!(
                    self.get(peer).map(|t| t.state),
                    Some(ThreadState::BlockedSend(to)) if to == receiver
                );
                waiting_on_us.then_some(peer)
            }
            None => self.get(receiver).and_then(|t| t.waiting_senders.peek_front()),
        };

        let Some(sender) = candidate else {
            if let Some(tcb) = self.get_mut(receiver) {
                tcb.state = ThreadState::BlockedRecv(from);
            }
            self.scheduler.stop(&mut self.threads, receiver);
            return RecvOutcome::Blocked;
        };

        self.with_waiting_list(receiver, |list, arena| {
            list.remove(arena, sender, |t| &mut t.wait_links);
        });
        let msg = self.get_mut(sender).and_then(|t| t.pending_message.take());
        if let Some(tcb) = self.get_mut(sender) {
            tcb.state = ThreadState::Ready;
        }
        self.scheduler.add_thread(&mut self.threads, sender);

        let mut delivered = msg.unwrap_or(Message::new(0, [0; crate::message::MESSAGE_DATA_WORDS]));
        delivered.sender = sender.val();
        RecvOutcome::Delivered(delivered)
    }

    /// `send_async(to, msg)`: non-blocking, fails with `WouldBlock` if
    /// `to`'s bounded queue is full.
    pub fn send_async(
        &mut self,
        sender: ThreadHandle,
        to: ThreadHandle,
        msg: Message,
    ) -> Result<(), SyscallError> {
        let mut delivered = msg;
        delivered.sender = sender.val();
        let tcb = self.get_mut(to).ok_or(SyscallError::InvalidArgument)?;
        if tcb.async_queue.push(delivered) {
            Ok(())
        } else {
            Err(SyscallError::WouldBlock)
        }
    }

    /// `recv_async()`: non-blocking, fails with `WouldBlock` if empty.
    pub fn recv_async(&mut self, receiver: ThreadHandle) -> Result<Message, SyscallError> {
        self.get_mut(receiver)
            .ok_or(SyscallError::InvalidArgument)?
            .async_queue
            .pop()
            .ok_or(SyscallError::WouldBlock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    Delivered(Message),
    Blocked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressSpaceTable, FrameAllocator};
    use crate::types::CreateThreadTarget;
    use mk_arch::{SimpleMemory, VirtAddr};

    fn setup() -> (SimpleMemory, FrameAllocator, AddressSpaceTable, ThreadManager, ThreadHandle) {
        let mut mem = SimpleMemory::new(4 * 1024 * 1024);
        let mut frames = FrameAllocator::new(1024);
        let mut spaces = AddressSpaceTable::new(&mut mem, &mut frames).unwrap();
        let mut tm = ThreadManager::new(4);
        let idle = tm.init(&mut frames, spaces.kernel()).unwrap();
        (mem, frames, spaces, tm, idle)
    }

    #[test]
    fn send_before_recv_blocks_sender_then_rendezvous_delivers() {
        let (mut mem, mut frames, mut spaces, mut tm, idle) = setup();
        let a = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current).unwrap();
        let b = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x2000), 0, CreateThreadTarget::Current).unwrap();

        let msg = Message::new(7, [1, 2, 3, 4]);
        let outcome = tm.send(a, b, msg).unwrap();
        assert_eq!(outcome, SendOutcome::Blocked);
        assert_eq!(tm.get(a).unwrap().state, ThreadState::BlockedSend(b));

        match tm.recv(b, None) {
            RecvOutcome::Delivered(got) => {
                assert_eq!(got.sender, a.val());
                assert_eq!(got.type_, 7);
            }
            RecvOutcome::Blocked => panic!("expected immediate delivery"),
        }
        assert_eq!(tm.get(a).unwrap().state, ThreadState::Ready);
    }

    #[test]
    fn recv_with_explicit_from_ignores_other_senders() {
        let (mut mem, mut frames, mut spaces, mut tm, idle) = setup();
        let a = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current).unwrap();
        let b = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x2000), 0, CreateThreadTarget::Current).unwrap();
        let c = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x3000), 0, CreateThreadTarget::Current).unwrap();

        tm.send(a, c, Message::new(1, [0; 4])).unwrap();
        let outcome = tm.recv(c, Some(b));
        assert_eq!(outcome, RecvOutcome::Blocked);
        assert_eq!(tm.get(a).unwrap().state, ThreadState::BlockedSend(c));
    }

    #[test]
    fn destroying_a_blocked_sender_unlinks_it_from_the_peer_inbox() {
        let (mut mem, mut frames, mut spaces, mut tm, idle) = setup();
        let a = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current).unwrap();
        let b = tm.create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x2000), 0, CreateThreadTarget::Current).unwrap();

        tm.send(a, b, Message::new(1, [0; 4])).unwrap();
        tm.destroy(a, &mut frames, &mut spaces);

        assert_eq!(tm.get(b).unwrap().waiting_senders.peek_front(), None);
        assert_eq!(tm.recv(b, None), RecvOutcome::Blocked);
    }
}
