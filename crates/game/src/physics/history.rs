use glam::Vec2;

use super::input::Buttons;

/// Full physical state of a body at one simulation frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoricalTransform {
    pub seq: i32,
    pub angle: f32,
    pub angle_delta: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub velocity_delta: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    transform: HistoricalTransform,
    input: Option<Buttons>,
}

/// Ring of transforms keyed by frame modulo capacity. Frames between
/// `oldest()` and `newest()` are always present and contiguous.
#[derive(Debug, Clone)]
pub struct StateHistory {
    slots: Vec<Option<Slot>>,
    capacity: usize,
    head: i32,
    tail: i32,
}

impl StateHistory {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize, initial: HistoricalTransform) -> Self {
        let capacity = capacity.max(2);
        let mut history = Self {
            slots: vec![None; capacity],
            capacity,
            head: initial.seq,
            tail: initial.seq,
        };
        let index = history.index(initial.seq);
        history.slots[index] = Some(Slot {
            transform: initial,
            input: None,
        });
        history
    }

    fn index(&self, seq: i32) -> usize {
        seq.rem_euclid(self.capacity as i32) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest(&self) -> i32 {
        self.head
    }

    pub fn oldest(&self) -> i32 {
        self.tail
    }

    pub fn contains(&self, seq: i32) -> bool {
        seq >= self.tail && seq <= self.head
    }

    pub fn exact(&self, seq: i32) -> Option<&HistoricalTransform> {
        if !self.contains(seq) {
            return None;
        }
        self.slots[self.index(seq)]
            .as_ref()
            .filter(|slot| slot.transform.seq == seq)
            .map(|slot| &slot.transform)
    }

    /// Transform at `seq`, clamped into the retained window.
    pub fn get(&self, seq: i32) -> HistoricalTransform {
        let seq = seq.clamp(self.tail, self.head);
        self.slots[self.index(seq)]
            .map(|slot| slot.transform)
            .unwrap_or_default()
    }

    pub fn input(&self, seq: i32) -> Option<Buttons> {
        if !self.contains(seq) {
            return None;
        }
        self.slots[self.index(seq)]
            .as_ref()
            .filter(|slot| slot.transform.seq == seq)
            .and_then(|slot| slot.input)
    }

    /// Writes the transform for `transform.seq`, overwriting an existing entry.
    /// Frames may only be appended directly after the newest one. Returns
    /// false for frames that fall outside the window.
    pub fn insert(&mut self, transform: HistoricalTransform, input: Option<Buttons>) -> bool {
        let seq = transform.seq;
        if seq < self.tail || seq > self.head + 1 {
            return false;
        }
        let index = self.index(seq);
        self.slots[index] = Some(Slot { transform, input });
        if seq > self.head {
            self.head = seq;
        }
        self.compact();
        true
    }

    // Frames that aliased into reused slots are gone; move the tail past them.
    fn compact(&mut self) {
        let oldest_retained = self.head - self.capacity as i32 + 1;
        if self.tail < oldest_retained {
            self.tail = oldest_retained;
        }
    }

    /// Walks back from the newest frame checking every retained slot holds
    /// the frame it should.
    pub fn is_consistent(&self) -> bool {
        (self.tail..=self.head).rev().all(|seq| {
            self.slots[self.index(seq)]
                .as_ref()
                .is_some_and(|slot| slot.transform.seq == seq)
        })
    }
}
