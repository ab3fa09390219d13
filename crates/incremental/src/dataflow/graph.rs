//! Dataflow graph management.

use crate::dataflow::operator::Operator;
use crate::dataflow::stream::{StreamReader, StreamWriter};
use crate::multiset::MultiSet;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ops::Deref;

/// Unique identifier for an operator in the dataflow graph.
pub type OperatorId = usize;

/// Items that can flow along a stream.
pub trait Data: Clone + 'static {}

impl<T: Clone + 'static> Data for T {}

#[derive(Default)]
struct GraphState {
    /// Operators in construction order. Every operator reads only from
    /// streams that existed before it, so this is a topological order.
    operators: Vec<Box<dyn Operator>>,
    next_id: OperatorId,
}

/// A dataflow graph that owns its operators and runs them in order.
///
/// `Graph` is a cheap handle; clones share the same operators.
#[derive(Clone, Default)]
pub struct Graph {
    state: Rc<RefCell<GraphState>>,
}

impl Graph {
    /// Creates a new empty dataflow graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an input edge that external code can push batches into.
    pub fn new_input<T: Data>(&self) -> Input<T> {
        Input {
            stream: Stream::new(self.clone(), StreamWriter::new()),
        }
    }

    pub(crate) fn next_operator_id(&self) -> OperatorId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub(crate) fn add_operator(&self, operator: impl Operator + 'static) {
        self.state.borrow_mut().operators.push(Box::new(operator));
    }

    /// Returns the number of operators in the graph.
    pub fn len(&self) -> usize {
        self.state.borrow().operators.len()
    }

    /// Returns true if the graph has no operators.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every operator once, in topological order.
    pub fn step(&self) {
        // Operators are taken out while running so callbacks may use the graph.
        let mut operators = core::mem::take(&mut self.state.borrow_mut().operators);
        for operator in operators.iter_mut() {
            operator.run();
        }
        let mut state = self.state.borrow_mut();
        let added = core::mem::replace(&mut state.operators, operators);
        state.operators.extend(added);
    }

    /// Returns true if any operator has undrained input.
    pub fn pending_work(&self) -> bool {
        self.state
            .borrow()
            .operators
            .iter()
            .any(|op| op.has_pending_work())
    }

    /// Steps the graph until no operator has pending input.
    pub fn run(&self) {
        while self.pending_work() {
            self.step();
        }
    }
}

/// A typed edge of a graph from which operators can be chained.
pub struct Stream<T> {
    graph: Graph,
    writer: StreamWriter<T>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            writer: self.writer.clone(),
        }
    }
}

impl<T: Data> Stream<T> {
    pub(crate) fn new(graph: Graph, writer: StreamWriter<T>) -> Self {
        Self { graph, writer }
    }

    /// Returns the graph this stream belongs to.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Attaches a new reader to this stream.
    pub fn connect_reader(&self) -> StreamReader<T> {
        self.writer.new_reader()
    }

    /// Creates a fresh output stream in the same graph.
    pub(crate) fn derive<U: Data>(&self) -> (StreamWriter<U>, Stream<U>) {
        let writer = StreamWriter::new();
        let stream = Stream::new(self.graph.clone(), writer.clone());
        (writer, stream)
    }
}

/// The entry edge of a graph.
pub struct Input<T> {
    stream: Stream<T>,
}

impl<T: Data> Input<T> {
    /// Publishes a batch into the graph. Nothing runs until the graph does.
    pub fn send_data(&self, batch: MultiSet<T>) {
        self.stream.writer.send_data(batch);
    }

    /// Returns the stream carrying this input's batches.
    pub fn stream(&self) -> &Stream<T> {
        &self.stream
    }
}

impl<T> Deref for Input<T> {
    type Target = Stream<T>;

    fn deref(&self) -> &Stream<T> {
        &self.stream
    }
}
