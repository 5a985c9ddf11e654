//! # Event Queue
//!
//! Buffers events emitted for a type nobody has subscribed to yet.
//!
//! The queue is a doubly linked list stored in a slot arena, plus a key index
//! for O(1) lookups:
//!
//! ```text
//! head (most recent)                               tail (oldest)
//!   ┌──────┐ next ┌──────┐ next ┌──────┐
//!   │ e3   │─────▶│ e2   │─────▶│ e1   │
//!   │      │◀─────│      │◀─────│      │
//!   └──────┘ prev └──────┘ prev └──────┘
//! ```
//!
//! Keys are `type:correlation_id`. Enqueueing a key that is already present
//! moves its node to the head instead of adding a copy, and when the queue
//! grows past `max_size` nodes are evicted from the tail.

use std::collections::HashMap;

use tracing::warn;

use crate::event::Event;

pub const DEFAULT_MAX_SIZE: usize = 1000;

#[derive(Debug)]
struct Node {
    event: Event,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    max_size: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            max_size,
        }
    }

    /// `type:correlation_id`, or `type:timestamp` when the id is empty.
    pub fn key_of(event: &Event) -> String {
        if event.correlation_id.as_str().is_empty() {
            format!("{}:{}", event.event_type, event.timestamp)
        } else {
            format!("{}:{}", event.event_type, event.correlation_id)
        }
    }

    pub fn enqueue(&mut self, event: Event) {
        let key = Self::key_of(&event);
        if let Some(&slot) = self.index.get(&key) {
            self.move_to_front(slot);
            return;
        }

        let node = Node {
            event,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.head {
            self.node_mut(old_head).prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        self.index.insert(key, slot);

        while self.index.len() > self.max_size {
            match self.pop_tail() {
                Some(evicted) => warn!(
                    "Event queue full ({}), evicted {}",
                    self.max_size,
                    evicted.qualified()
                ),
                None => break,
            }
        }
    }

    /// Removes and returns the oldest event.
    pub fn dequeue(&mut self) -> Option<Event> {
        self.pop_tail()
    }

    /// Hands every queued event to `callback`, head to tail, then empties the
    /// queue. Futures started by the callback are not awaited here.
    pub fn process<F>(&mut self, mut callback: F)
    where
        F: FnMut(&Event),
    {
        for event in self.iter() {
            callback(event);
        }
        self.clear();
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Head (most recent) to tail (oldest).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    fn node(&self, slot: usize) -> &Node {
        self.slots[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("linked slot {} is vacant", slot))
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.slots[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("linked slot {} is vacant", slot))
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(slot);
        node.prev = None;
        node.next = None;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        let old_head = self.head;
        self.node_mut(slot).next = old_head;
        if let Some(old_head) = old_head {
            self.node_mut(old_head).prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn pop_tail(&mut self) -> Option<Event> {
        let slot = self.tail?;
        self.unlink(slot);
        let node = self.slots[slot].take()?;
        self.free.push(slot);
        self.index.remove(&Self::key_of(&node.event));
        Some(node.event)
    }
}

pub struct Iter<'a> {
    queue: &'a EventQueue,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.node(self.cursor?);
        self.cursor = node.next;
        Some(&node.event)
    }
}
