//! Dataflow graph primitives: stream edges, operator shapes and the graph.

pub mod graph;
pub mod operator;
pub mod stream;

pub use graph::{Data, Graph, Input, OperatorId, Stream};
pub use operator::{BinaryOperator, LinearFn, LinearUnaryOperator, Operator, UnaryOperator};
pub use stream::{StreamReader, StreamWriter};
