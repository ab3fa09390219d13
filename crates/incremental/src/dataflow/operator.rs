//! Operator trait and the base operator shapes.

use crate::dataflow::graph::OperatorId;
use crate::dataflow::stream::{StreamReader, StreamWriter};
use crate::multiset::MultiSet;
use alloc::boxed::Box;

/// A node of the dataflow graph.
pub trait Operator {
    /// Returns the operator's identity within its graph.
    fn id(&self) -> OperatorId;

    /// Drains pending input and publishes the resulting output.
    fn run(&mut self);

    /// Returns true if any input reader has undrained data.
    fn has_pending_work(&self) -> bool;
}

/// Base of operators with one input and one output.
pub struct UnaryOperator<T, U> {
    pub id: OperatorId,
    pub input: StreamReader<T>,
    pub output: StreamWriter<U>,
}

impl<T, U> UnaryOperator<T, U> {
    pub fn new(id: OperatorId, input: StreamReader<T>, output: StreamWriter<U>) -> Self {
        Self { id, input, output }
    }

    /// Drains the input and flattens all batches into one multiset.
    pub fn input_messages(&self) -> MultiSet<T> {
        let mut all = MultiSet::new();
        for batch in self.input.drain() {
            all.extend(batch);
        }
        all
    }

    pub fn has_pending_work(&self) -> bool {
        !self.input.is_empty()
    }
}

/// Base of operators with two inputs and one output.
pub struct BinaryOperator<A, B, U> {
    pub id: OperatorId,
    pub input_a: StreamReader<A>,
    pub input_b: StreamReader<B>,
    pub output: StreamWriter<U>,
}

impl<A, B, U> BinaryOperator<A, B, U> {
    pub fn new(
        id: OperatorId,
        input_a: StreamReader<A>,
        input_b: StreamReader<B>,
        output: StreamWriter<U>,
    ) -> Self {
        Self {
            id,
            input_a,
            input_b,
            output,
        }
    }

    /// Drains the first input and flattens its batches.
    pub fn input_a_messages(&self) -> MultiSet<A> {
        let mut all = MultiSet::new();
        for batch in self.input_a.drain() {
            all.extend(batch);
        }
        all
    }

    /// Drains the second input and flattens its batches.
    pub fn input_b_messages(&self) -> MultiSet<B> {
        let mut all = MultiSet::new();
        for batch in self.input_b.drain() {
            all.extend(batch);
        }
        all
    }

    pub fn has_pending_work(&self) -> bool {
        !self.input_a.is_empty() || !self.input_b.is_empty()
    }
}

/// Boxed per-batch transform of a linear operator.
pub type LinearFn<T, U> = Box<dyn FnMut(MultiSet<T>) -> MultiSet<U>>;

/// A unary operator whose output is a pure function of each input batch.
///
/// Covers map, filter, negate and the keying operators.
pub struct LinearUnaryOperator<T, U> {
    base: UnaryOperator<T, U>,
    inner: LinearFn<T, U>,
}

impl<T, U> LinearUnaryOperator<T, U> {
    pub fn new(
        id: OperatorId,
        input: StreamReader<T>,
        output: StreamWriter<U>,
        inner: impl FnMut(MultiSet<T>) -> MultiSet<U> + 'static,
    ) -> Self {
        Self {
            base: UnaryOperator::new(id, input, output),
            inner: Box::new(inner),
        }
    }
}

impl<T, U: Clone> Operator for LinearUnaryOperator<T, U> {
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        for batch in self.base.input.drain() {
            let out = (self.inner)(batch);
            if !out.is_empty() {
                self.base.output.send_data(out);
            }
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}
