//! Round-robin ready queue.
//!
//! Tasks live in an arena and are linked into one circular, doubly-linked
//! queue by [`TaskId`] handles instead of pointers:
//!
//! ```text
//!          head                        tail
//!           |                           |
//!           v                           v
//!   None <- [T1] <-> [T2] <-> [T3] <-> [T4] -> None
//!                     ^
//!                  current
//! ```
//!
//! The queue is circular only in how [`ReadyQueue::next`] walks it: the
//! successor of the tail is the head. `current` is a cursor into the queue
//! and names the task that owns the CPU.
//!
//! A [`TaskId`] carries a generation, so a handle to a removed task never
//! resolves to whatever later reuses its arena slot.

use super::Task;
use abyss::cpu::Cr3;

/// Handle of a task in the [`ReadyQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

struct Node {
    task: Task,
    prev: Option<TaskId>,
    next: Option<TaskId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The ready queue and the arena holding every live task.
#[derive(Default)]
pub struct ReadyQueue {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    head: Option<TaskId>,
    tail: Option<TaskId>,
    current: Option<TaskId>,
    len: usize,
}

impl ReadyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: TaskId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: TaskId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn link_mut(&mut self, id: TaskId) -> &mut Node {
        match self.node_mut(id) {
            Some(node) => node,
            None => panic!("Ready queue is corrupted: {id:?} is linked but not live."),
        }
    }

    /// Appends `task` at the tail.
    ///
    /// If the queue was empty, the new task also becomes current.
    pub fn push(&mut self, task: Task) -> TaskId {
        let node = Node {
            task,
            prev: self.tail,
            next: None,
        };
        let id = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                TaskId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                TaskId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        match self.tail {
            Some(tail) => self.link_mut(tail).next = Some(id),
            None => {
                self.head = Some(id);
                self.current = Some(id);
            }
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Unlinks `id` and returns its task.
    ///
    /// If `id` was current, `current` moves to its predecessor in circular
    /// order, so the next [`ReadyQueue::next`] lands on the removed task's
    /// successor. Removing the last task leaves no current task.
    ///
    /// # Panics
    /// If `id` does not name a live task.
    pub fn remove(&mut self, id: TaskId) -> Task {
        let (prev, next) = match self.node(id) {
            Some(node) => (node.prev, node.next),
            None => panic!("Removing {id:?}, which is not in the ready queue."),
        };
        match prev {
            Some(prev) => self.link_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.link_mut(next).prev = prev,
            None => self.tail = prev,
        }
        if self.current == Some(id) {
            self.current = prev.or(self.tail);
        }
        let slot = &mut self.slots[id.index as usize];
        let node = slot.node.take().map(|node| node.task);
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        self.len -= 1;
        node.expect("A linked slot holds a task.")
    }

    /// Returns the task after `current`, wrapping from the tail to the head.
    ///
    /// # Panics
    /// If no task is current. Scheduling with nothing to schedule is a
    /// kernel bug.
    pub fn next(&self) -> TaskId {
        let current = match self.current {
            Some(current) => current,
            None => panic!("Scheduling with an empty ready queue."),
        };
        match self.node(current).and_then(|node| node.next).or(self.head) {
            Some(next) => next,
            None => panic!("Scheduling with an empty ready queue."),
        }
    }

    /// The task that owns the CPU.
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// Makes `id` the current task.
    ///
    /// # Panics
    /// If `id` does not name a live task.
    pub fn set_current(&mut self, id: TaskId) {
        assert!(self.node(id).is_some(), "{id:?} is not in the ready queue.");
        self.current = Some(id);
    }

    /// First task of the queue.
    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    /// Last task of the queue.
    pub fn tail(&self) -> Option<TaskId> {
        self.tail
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `id` names a live task.
    pub fn contains(&self, id: TaskId) -> bool {
        self.node(id).is_some()
    }

    /// Predecessor and successor of `id`, as stored in the queue.
    pub fn links(&self, id: TaskId) -> Option<(Option<TaskId>, Option<TaskId>)> {
        self.node(id).map(|node| (node.prev, node.next))
    }

    /// The task behind `id`.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.node(id).map(|node| &node.task)
    }

    /// The task behind `id`, mutably.
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.node_mut(id).map(|node| &mut node.task)
    }

    /// Walks the queue from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        core::iter::successors(self.head, |id| self.node(*id).and_then(|node| node.next))
    }

    /// Finds the task whose address space is selected by `root`.
    pub fn find_by_root(&self, root: Cr3) -> Option<TaskId> {
        self.iter()
            .find(|id| self.get(*id).is_some_and(|task| task.space().root() == root))
    }
}
