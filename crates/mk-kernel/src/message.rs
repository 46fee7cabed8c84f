use bytemuck::{Pod, Zeroable};

/// Number of `u32` payload words carried by a [`Message`]. Small enough to
/// fit in registers or a single cache line, per the wire-format contract.
pub const MESSAGE_DATA_WORDS: usize = 4;

/// Fixed-layout value copied by value at the kernel boundary. `sender` is
/// always filled in by the kernel on the receiving end; `type_` and `data`
/// are user-defined payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Message {
    pub sender: u32,
    pub type_: u32,
    pub data: [u32; MESSAGE_DATA_WORDS],
}

impl Message {
    pub const fn new(type_: u32, data: [u32; MESSAGE_DATA_WORDS]) -> Self {
        Self {
            sender: 0,
            type_,
            data,
        }
    }
}

/// Bounded circular buffer of messages owned by a thread for the
/// asynchronous IPC path.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    slots: Vec<Message>,
    head: usize,
    count: usize,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Message::zeroed(); capacity],
            head: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Enqueues `msg`, returning `false` (without mutating state) if full.
    pub fn push(&mut self, msg: Message) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.count) % self.slots.len();
        self.slots[tail] = msg;
        self.count += 1;
        true
    }

    /// Dequeues the oldest message, or `None` if empty.
    pub fn pop(&mut self) -> Option<Message> {
        if self.is_empty() {
            return None;
        }
        let msg = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        Some(msg)
    }
}
