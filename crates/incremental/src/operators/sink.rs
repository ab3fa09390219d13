//! Observation operators: debug, tap and output.

use crate::dataflow::{Data, Operator, OperatorId, Stream, StreamReader, StreamWriter};
use crate::multiset::MultiSet;
use alloc::boxed::Box;
use alloc::string::String;
use core::fmt::Debug;

type BatchCallback<T> = Box<dyn FnMut(&MultiSet<T>)>;

impl<T: Data> Stream<T> {
    /// Passes batches through unchanged, invoking `callback` on each first.
    pub fn tap(&self, callback: impl FnMut(&MultiSet<T>) + 'static) -> Stream<T> {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(TapOperator {
            id,
            input: self.connect_reader(),
            output: Some(writer),
            callback: Box::new(callback),
        });
        stream
    }

    /// Terminates the stream in a sink invoking `callback` per batch.
    pub fn output(&self, callback: impl FnMut(&MultiSet<T>) + 'static) {
        let id = self.graph().next_operator_id();
        self.graph().add_operator(TapOperator {
            id,
            input: self.connect_reader(),
            output: None,
            callback: Box::new(callback),
        });
    }
}

impl<T: Data + Debug> Stream<T> {
    /// Passes batches through unchanged, logging each at debug level.
    pub fn debug(&self, name: impl Into<String>) -> Stream<T> {
        let name = name.into();
        self.tap(move |batch| {
            tracing::debug!(operator = %name, entries = batch.len(), batch = ?batch, "debug");
        })
    }
}

struct TapOperator<T> {
    id: OperatorId,
    input: StreamReader<T>,
    output: Option<StreamWriter<T>>,
    callback: BatchCallback<T>,
}

impl<T: Clone> Operator for TapOperator<T> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn run(&mut self) {
        for batch in self.input.drain() {
            (self.callback)(&batch);
            if let Some(output) = &self.output {
                output.send_data(batch);
            }
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.input.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::dataflow::Graph;
    use crate::multiset::MultiSet;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    #[test]
    fn test_output_receives_every_batch() {
        let graph = Graph::new();
        let input = graph.new_input::<i32>();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        input.map(|x| x + 1).output(move |batch| sink.borrow_mut().push(batch.clone()));

        input.send_data(MultiSet::from_vec(vec![(1, 1)]));
        input.send_data(MultiSet::from_vec(vec![(2, -1)]));
        graph.run();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].inner(), &[(3, -1)]);
    }

    #[test]
    fn test_tap_and_debug_pass_through() {
        let graph = Graph::new();
        let input = graph.new_input::<&str>();
        let count = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&count);
        let reader = input
            .tap(move |batch| *counter.borrow_mut() += batch.len())
            .debug("after-tap")
            .connect_reader();

        input.send_data(MultiSet::from_vec(vec![("a", 1), ("b", 1)]));
        graph.run();

        assert_eq!(*count.borrow(), 2);
        assert_eq!(reader.drain()[0].inner(), &[("a", 1), ("b", 1)]);
    }
}
