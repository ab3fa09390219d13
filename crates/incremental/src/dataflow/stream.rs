//! Stream edges connecting dataflow operators.
//!
//! A `StreamWriter` broadcasts every batch to all readers created from it.
//! Each `StreamReader` owns its own queue, so draining one reader never
//! affects another. The writer only holds weak handles to the queues, so a
//! dropped reader stops receiving batches.

use crate::multiset::MultiSet;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;

type Queue<T> = Rc<RefCell<VecDeque<MultiSet<T>>>>;

/// Write handle of a stream edge.
pub struct StreamWriter<T> {
    queues: Rc<RefCell<Vec<Weak<RefCell<VecDeque<MultiSet<T>>>>>>>,
}

impl<T> Clone for StreamWriter<T> {
    fn clone(&self) -> Self {
        Self {
            queues: Rc::clone(&self.queues),
        }
    }
}

impl<T> Default for StreamWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StreamWriter<T> {
    /// Creates a writer with no readers.
    pub fn new() -> Self {
        Self {
            queues: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Creates a reader that observes every batch sent from now on.
    pub fn new_reader(&self) -> StreamReader<T> {
        let queue: Queue<T> = Rc::new(RefCell::new(VecDeque::new()));
        self.queues.borrow_mut().push(Rc::downgrade(&queue));
        StreamReader { queue }
    }

    /// Returns the number of live readers.
    pub fn reader_count(&self) -> usize {
        self.queues.borrow().iter().filter(|q| q.strong_count() > 0).count()
    }
}

impl<T: Clone> StreamWriter<T> {
    /// Publishes a batch to every reader.
    pub fn send_data(&self, batch: MultiSet<T>) {
        let mut queues = self.queues.borrow_mut();
        queues.retain(|q| q.strong_count() > 0);
        let live: Vec<Queue<T>> = queues.iter().filter_map(Weak::upgrade).collect();
        drop(queues);
        if let Some((last, rest)) = live.split_last() {
            for queue in rest {
                queue.borrow_mut().push_back(batch.clone());
            }
            last.borrow_mut().push_back(batch);
        }
    }
}

/// Read handle of a stream edge.
pub struct StreamReader<T> {
    queue: Queue<T>,
}

impl<T> StreamReader<T> {
    /// Removes and returns every batch queued since the last drain.
    pub fn drain(&self) -> Vec<MultiSet<T>> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Returns true if no batch is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_broadcast_to_all_readers() {
        let writer = StreamWriter::new();
        let a = writer.new_reader();
        let b = writer.new_reader();

        writer.send_data(MultiSet::from_vec(vec![(1, 1)]));
        writer.send_data(MultiSet::from_vec(vec![(2, 1)]));

        assert_eq!(a.drain().len(), 2);
        assert!(a.is_empty());
        // b keeps its own cursor
        assert!(!b.is_empty());
        assert_eq!(b.drain().len(), 2);
    }

    #[test]
    fn test_reader_never_sees_batch_twice() {
        let writer = StreamWriter::new();
        let reader = writer.new_reader();
        writer.send_data(MultiSet::from_vec(vec![("x", 1)]));
        assert_eq!(reader.drain().len(), 1);
        assert!(reader.drain().is_empty());
    }

    #[test]
    fn test_late_reader_starts_empty() {
        let writer = StreamWriter::new();
        writer.send_data(MultiSet::from_vec(vec![(1, 1)]));
        let reader = writer.new_reader();
        assert!(reader.is_empty());
        assert_eq!(writer.reader_count(), 1);
    }

    #[test]
    fn test_dropped_reader_is_pruned() {
        let writer = StreamWriter::new();
        let kept = writer.new_reader();
        let dropped = writer.new_reader();
        let queue = Rc::downgrade(&dropped.queue);
        drop(dropped);
        assert_eq!(writer.reader_count(), 1);

        writer.send_data(MultiSet::from_vec(vec![(1, 1)]));
        assert!(queue.upgrade().is_none());
        assert_eq!(writer.queues.borrow().len(), 1);
        assert_eq!(kept.drain().len(), 1);
    }
}
