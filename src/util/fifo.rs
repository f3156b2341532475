//! FIFO implemented using VecDeque
use serde::{Deserialize, Serialize};
use std::collections::vec_deque::{IntoIter, Iter};
use std::collections::VecDeque;

/// Verdict of a [`FIFO::dequeue_until`] acceptor after each popped item.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Drain {
    /// Keep popping.
    Continue,
    /// The last popped item covers more than was asked for.
    Overflow,
    /// The request was met exactly.
    Done,
    /// The queue ran dry before the request was met.
    Underflow,
}

#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct FIFO<A> {
    deq: VecDeque<A>,
}

impl<A> Default for FIFO<A> {
    fn default() -> Self {
        Self {
            deq: VecDeque::new(),
        }
    }
}

impl<A> FIFO<A> {
    pub fn new() -> Self {
        Self {
            deq: VecDeque::new(),
        }
    }
    pub fn iter(&self) -> Iter<'_, A> {
        self.deq.iter()
    }
    pub fn enqueue(&mut self, e: A) {
        self.deq.push_back(e);
    }
    pub fn dequeue(&mut self) -> Option<A> {
        self.deq.pop_front()
    }
    pub fn put_back(&mut self, e: A) {
        // a LIFO thing, used for splits
        //   (intended sequence: pop; split -> (a,b); consume a; put_back b;)
        self.deq.push_front(e);
    }
    pub fn peek_front(&self) -> Option<&A> {
        self.deq.front()
    }
    pub fn len(&self) -> usize {
        self.deq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.deq.is_empty()
    }
    pub fn clear(&mut self) {
        self.deq.clear();
    }

    /// Pop items from the front until `accept` returns anything but [`Drain::Continue`].
    ///
    /// Returns the popped items along with the terminal verdict. When the queue runs dry first,
    /// the verdict is [`Drain::Underflow`], or [`Drain::Done`] if nothing was popped at all.
    pub fn dequeue_until<F>(&mut self, mut accept: F) -> (Vec<A>, Drain)
    where
        F: FnMut(&A) -> Drain,
    {
        let mut taken = Vec::new();

        while let Some(item) = self.deq.pop_front() {
            let verdict = accept(&item);
            taken.push(item);

            if verdict != Drain::Continue {
                return (taken, verdict);
            }
        }

        let verdict = if taken.is_empty() {
            Drain::Done
        } else {
            Drain::Underflow
        };

        (taken, verdict)
    }
}

impl<A> FromIterator<A> for FIFO<A> {
    // see https://docs.rs/from_iter/latest/from_iter/trait.FromIterator.html
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        let iterator = iter.into_iter();
        let mut deq = FIFO::<A>::new();
        deq.extend(iterator);
        deq
    }
}

impl<A> IntoIterator for FIFO<A> {
    type Item = A;
    type IntoIter = IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.deq.into_iter()
    }
}

impl<A> Extend<A> for FIFO<A> {
    fn extend<T: IntoIterator<Item = A>>(&mut self, iter: T) {
        for item in iter.into_iter() {
            self.enqueue(item);
        }
    }
}
