//! Compilation of query IR into dataflow pipelines.
//!
//! A query compiles into operators on the graph its input streams belong to:
//!
//! 1. Every source is read as `(row key, {alias: row})` (namespaced rows)
//! 2. Joins merge namespaced rows, keyed by the pair of row keys
//! 3. WHERE filters namespaced rows
//! 4. GROUP BY/HAVING replace rows by one aggregated row per group
//! 5. SELECT shapes the result value and ORDER BY computes its sort key
//! 6. DISTINCT keeps one row per selected value
//! 7. LIMIT/OFFSET keep a top-k window over the ordering
//!
//! The output carries `ResultRow`s keyed by result key; ordering is not
//! materialized unless a window requires it, callers sort with `RowOrdering`.

pub mod expression;
pub(crate) mod functions;
pub mod group_by;
mod joins;
mod order_by;

pub use expression::{compile_expression, compile_single_row_expression, is_truthy, CompiledExpr};
pub use group_by::replace_aggregates_by_refs;
pub use order_by::{compare_order_keys, RowOrdering};

use crate::ast::{Expr, QueryIR, Source};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use group_by::GroupRewriter;
use hashbrown::{HashMap, HashSet};
use rivulet_core::{Error, Result, Value};
use rivulet_incremental::{Stream, TopKOptions};

/// A stream of `(row key, row)` pairs feeding a query.
pub type SourceStream = Stream<(Value, Value)>;

/// Loads rows of a lazily joined source on demand.
pub trait LazyLoader {
    /// Requests the rows whose `path` field equals one of `keys`.
    fn load_keys(&self, path: &[String], keys: &[Value]);
}

/// One result row and the key it sorts by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResultRow {
    pub value: Value,
    /// Array of the ORDER BY values; empty when the query is unordered.
    pub order_key: Value,
}

/// The streams and loaders a query is compiled against, keyed by the alias
/// of each collection source.
#[derive(Default)]
pub struct CompileInputs {
    pub streams: HashMap<String, SourceStream>,
    pub lazy_loaders: HashMap<String, Rc<dyn LazyLoader>>,
}

impl CompileInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, alias: &str, stream: SourceStream) -> Self {
        self.streams.insert(alias.to_string(), stream);
        self
    }

    /// Allows the source under `alias` to be loaded by key when it is joined.
    pub fn with_lazy_loader(mut self, alias: &str, loader: Rc<dyn LazyLoader>) -> Self {
        self.lazy_loaders.insert(alias.to_string(), loader);
        self
    }
}

/// A compiled query.
pub struct CompiledQuery {
    /// `(result key, row)` deltas of the query result.
    pub output: Stream<(Value, ResultRow)>,
    /// Sources that are loaded by key rather than read in full.
    pub lazy_aliases: HashSet<String>,
    pub ordering: RowOrdering,
}

impl CompiledQuery {
    /// Orders two result rows as the query's ORDER BY does, ties by key.
    pub fn compare(&self, a_key: &Value, a: &ResultRow, b_key: &Value, b: &ResultRow) -> Ordering {
        self.ordering.compare(a_key, a, b_key, b)
    }
}

/// Compiles `query` onto the graph of `inputs`.
pub fn compile_query(query: &QueryIR, inputs: &CompileInputs) -> Result<CompiledQuery> {
    let mut compiler = Compiler {
        inputs,
        lazy_aliases: HashSet::new(),
    };
    let (output, ordering) = compiler.compile(query)?;
    Ok(CompiledQuery {
        output,
        lazy_aliases: compiler.lazy_aliases,
        ordering,
    })
}

/// How row-level expressions see their input.
pub(crate) enum RowScope<'a> {
    /// Namespaced rows of the listed aliases.
    Namespaced(&'a [String]),
    /// Aggregated rows of a grouped query.
    Grouped(&'a GroupRewriter),
}

impl RowScope<'_> {
    pub(crate) fn compile(&self, expr: &Expr) -> Result<CompiledExpr> {
        match self {
            RowScope::Namespaced(aliases) => compile_expression(expr, aliases),
            RowScope::Grouped(rewriter) => rewriter.compile(expr),
        }
    }
}

pub(crate) struct Compiler<'a> {
    inputs: &'a CompileInputs,
    lazy_aliases: HashSet<String>,
}

impl Compiler<'_> {
    fn compile(&mut self, query: &QueryIR) -> Result<(Stream<(Value, ResultRow)>, RowOrdering)> {
        let mut scope: Vec<String> = Vec::from([query.from.alias().to_string()]);
        let mut rows = self.source_stream(&query.from)?;

        for (i, clause) in query.join.iter().enumerate() {
            rows = joins::process_join(self, query, i, clause, rows, &mut scope)?;
        }

        if let Some(predicate) = Expr::conjunction(query.where_.clone()) {
            let predicate = compile_expression(&predicate, &scope)?;
            rows = rows.filter(move |(_, row)| is_truthy(&predicate(row)));
        }

        let rewriter;
        let row_scope = if query.is_grouped() {
            rewriter = GroupRewriter::new(query);
            rows = group_by::process_group_by(rows, query, &scope, &rewriter)?;
            RowScope::Grouped(&rewriter)
        } else {
            RowScope::Namespaced(&scope)
        };

        let select = self.compile_select(query, &row_scope)?;
        let order_key = order_by::compile_order_key(&query.order_by, &row_scope)?;
        let mut results = rows.map(move |(key, row)| {
            let value = select(&row);
            let order_key = order_key(&row);
            (key, ResultRow { value, order_key })
        });

        if query.distinct {
            // one row per selected value; the value becomes the result key
            results = results
                .map(|(_, row)| (row.value.clone(), row))
                .distinct_by(|(key, _)| key.clone());
        }

        let ordering = RowOrdering::new(&query.order_by);
        if query.limit.is_some() || query.offset.is_some() {
            let options = TopKOptions {
                limit: query.limit,
                offset: query.offset.unwrap_or(0),
            };
            let window = ordering.clone();
            results = results
                .map(|entry| ((), entry))
                .top_k(move |(ka, a), (kb, b)| window.compare(ka, a, kb, b), options)
                .map(|(_, entry)| entry);
        }

        Ok((results, ordering))
    }

    /// Reads a source as namespaced rows.
    pub(crate) fn source_stream(&mut self, source: &Source) -> Result<SourceStream> {
        match source {
            Source::Collection { id, alias } => {
                let input = self
                    .inputs
                    .streams
                    .get(alias)
                    .ok_or_else(|| Error::collection_not_found(id.clone()))?;
                let alias = alias.clone();
                Ok(input.map(move |(key, row)| (key, Value::object([(alias.clone(), row)]))))
            }
            Source::Query { query, alias } => {
                let (output, _) = self.compile(query)?;
                let alias = alias.clone();
                Ok(output.map(move |(key, row)| (key, Value::object([(alias.clone(), row.value)]))))
            }
        }
    }

    fn compile_select(&self, query: &QueryIR, scope: &RowScope<'_>) -> Result<CompiledExpr> {
        let Some(columns) = &query.select else {
            if let RowScope::Grouped(_) = scope {
                return Err(Error::invalid_query("a grouped query needs a SELECT"));
            }
            if query.join.is_empty() {
                let alias = query.from.alias().to_string();
                return Ok(Rc::new(move |row: &Value| row.get(&alias).clone()));
            }
            return Ok(Rc::new(|row: &Value| row.clone()));
        };
        let columns = columns
            .iter()
            .map(|(name, expr)| Ok((name.clone(), scope.compile(expr)?)))
            .collect::<Result<Vec<(String, CompiledExpr)>>>()?;
        Ok(Rc::new(move |row: &Value| {
            Value::object(columns.iter().map(|(name, f)| (name.clone(), f(row))))
        }))
    }

    pub(crate) fn inputs(&self) -> &CompileInputs {
        self.inputs
    }

    pub(crate) fn mark_lazy(&mut self, alias: &str) {
        self.lazy_aliases.insert(alias.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::{agg, func, ref_, val, Query};
    use crate::ast::{Direction, JoinKind};
    use alloc::vec;
    use core::cell::RefCell;
    use rivulet_incremental::{Graph, Input, MultiSet};

    struct Harness {
        graph: Graph,
        inputs: HashMap<String, Input<(Value, Value)>>,
        compiled: CompiledQuery,
        results: Rc<RefCell<HashMap<Value, (ResultRow, i64)>>>,
    }

    impl Harness {
        fn new(query: &QueryIR) -> Self {
            Self::try_new(query).unwrap()
        }

        fn try_new(query: &QueryIR) -> Result<Self> {
            let graph = Graph::new();
            let mut inputs = HashMap::new();
            let mut compile_inputs = CompileInputs::new();
            for (alias, _) in query.collection_sources() {
                let input = graph.new_input::<(Value, Value)>();
                compile_inputs = compile_inputs.with_stream(&alias, input.stream().clone());
                inputs.insert(alias, input);
            }
            let compiled = compile_query(query, &compile_inputs)?;
            let results = Rc::new(RefCell::new(HashMap::new()));
            let sink = Rc::clone(&results);
            compiled.output.output(move |batch| {
                let mut results = sink.borrow_mut();
                for ((key, row), m) in batch.iter() {
                    let entry = results.entry(key.clone()).or_insert((row.clone(), 0));
                    if *m > 0 {
                        entry.0 = row.clone();
                    }
                    entry.1 += m;
                    if entry.1 == 0 {
                        results.remove(key);
                    }
                }
            });
            Ok(Self {
                graph,
                inputs,
                compiled,
                results,
            })
        }

        fn send(&self, alias: &str, rows: Vec<(Value, i64)>) {
            let batch = rows.into_iter().map(|(row, m)| ((row.get("id").clone(), row), m)).collect();
            self.inputs[alias].send_data(MultiSet::from_vec(batch));
            self.graph.run();
        }

        fn values(&self) -> Vec<Value> {
            let results = self.results.borrow();
            let mut rows: Vec<(&Value, &ResultRow)> = results.iter().map(|(k, (r, _))| (k, r)).collect();
            rows.sort_by(|a, b| self.compiled.compare(a.0, a.1, b.0, b.1));
            rows.into_iter().map(|(_, r)| r.value.clone()).collect()
        }
    }

    fn user(id: i64, name: &str, dept: &str, age: i64) -> Value {
        Value::object([
            ("id", Value::Int64(id)),
            ("name", Value::from(name)),
            ("dept", Value::from(dept)),
            ("age", Value::Int64(age)),
        ])
    }

    fn dept(id: &str, floor: i64) -> Value {
        Value::object([("id", Value::from(id)), ("floor", Value::Int64(floor))])
    }

    #[test]
    fn test_where_and_select() {
        let q = Query::from_collection("users", "u")
            .where_(Expr::eq(ref_("u.dept"), val("eng")))
            .select([("name", ref_("u.name"))])
            .order_by(ref_("u.name"), Direction::Asc)
            .build();
        let h = Harness::new(&q);
        h.send("u", vec![(user(1, "Bo", "eng", 30), 1), (user(2, "Al", "ops", 40), 1), (user(3, "Cy", "eng", 22), 1)]);
        assert_eq!(
            h.values(),
            vec![Value::object([("name", Value::from("Bo"))]), Value::object([("name", Value::from("Cy"))])]
        );

        h.send("u", vec![(user(1, "Bo", "eng", 30), -1), (user(1, "Bo", "ops", 30), 1)]);
        assert_eq!(h.values(), vec![Value::object([("name", Value::from("Cy"))])]);
    }

    #[test]
    fn test_no_select_returns_source_rows() {
        let q = Query::from_collection("users", "u").build();
        let h = Harness::new(&q);
        h.send("u", vec![(user(1, "Bo", "eng", 30), 1)]);
        assert_eq!(h.values(), vec![user(1, "Bo", "eng", 30)]);
    }

    #[test]
    fn test_inner_and_left_join() {
        for (kind, expected) in [(JoinKind::Inner, 1usize), (JoinKind::Left, 2)] {
            let q = Query::from_collection("users", "u")
                .join_collection("depts", "d", kind, ref_("u.dept"), ref_("d.id"))
                .select([("name", ref_("u.name")), ("floor", ref_("d.floor"))])
                .order_by(ref_("u.id"), Direction::Asc)
                .build();
            let h = Harness::new(&q);
            h.send("d", vec![(dept("eng", 3), 1)]);
            h.send("u", vec![(user(1, "Bo", "eng", 30), 1), (user(2, "Al", "ops", 40), 1)]);
            let values = h.values();
            assert_eq!(values.len(), expected);
            assert_eq!(values[0], Value::object([("name", Value::from("Bo")), ("floor", Value::Int64(3))]));
            if kind == JoinKind::Left {
                assert_eq!(values[1], Value::object([("name", Value::from("Al")), ("floor", Value::Null)]));
            }
        }
    }

    #[test]
    fn test_join_on_null_key_does_not_match() {
        let q = Query::from_collection("users", "u")
            .join_collection("depts", "d", JoinKind::Inner, ref_("u.dept"), ref_("d.id"))
            .build();
        let h = Harness::new(&q);
        let no_dept = Value::object([("id", Value::Int64(1)), ("dept", Value::Null)]);
        let null_dept = Value::object([("id", Value::Null), ("floor", Value::Int64(0))]);
        h.inputs["d"].send_data(MultiSet::singleton((Value::from("nil"), null_dept), 1));
        h.send("u", vec![(no_dept, 1)]);
        assert!(h.values().is_empty());
    }

    #[test]
    fn test_join_condition_may_be_reversed() {
        let q = Query::from_collection("users", "u")
            .join_collection("depts", "d", JoinKind::Inner, ref_("d.id"), ref_("u.dept"))
            .select([("floor", ref_("d.floor"))])
            .build();
        let h = Harness::new(&q);
        h.send("d", vec![(dept("eng", 3), 1)]);
        h.send("u", vec![(user(1, "Bo", "eng", 30), 1)]);
        assert_eq!(h.values(), vec![Value::object([("floor", Value::Int64(3))])]);
    }

    #[test]
    fn test_group_by_having() {
        let q = Query::from_collection("users", "u")
            .select([
                ("dept", ref_("u.dept")),
                ("n", agg("count", vec![])),
                ("avg_age", agg("avg", vec![ref_("u.age")])),
            ])
            .group_by(ref_("u.dept"))
            .having(func("gt", vec![agg("count", vec![]), val(1i64)]))
            .order_by(ref_("u.dept"), Direction::Asc)
            .build();
        let h = Harness::new(&q);
        h.send(
            "u",
            vec![
                (user(1, "Bo", "eng", 30), 1),
                (user(2, "Al", "ops", 40), 1),
                (user(3, "Cy", "eng", 20), 1),
            ],
        );
        assert_eq!(
            h.values(),
            vec![Value::object([
                ("dept", Value::from("eng")),
                ("n", Value::Int64(2)),
                ("avg_age", Value::Float64(25.0)),
            ])]
        );

        h.send("u", vec![(user(4, "Di", "ops", 50), 1), (user(3, "Cy", "eng", 20), -1)]);
        assert_eq!(
            h.values(),
            vec![Value::object([
                ("dept", Value::from("ops")),
                ("n", Value::Int64(2)),
                ("avg_age", Value::Float64(45.0)),
            ])]
        );
    }

    #[test]
    fn test_ungrouped_select_is_rejected() {
        let q = Query::from_collection("users", "u")
            .select([("name", ref_("u.name")), ("n", agg("count", vec![]))])
            .group_by(ref_("u.dept"))
            .build();
        assert!(matches!(
            Harness::try_new(&q).err(),
            Some(Error::NonAggregateNotGrouped { .. })
        ));
    }

    #[test]
    fn test_order_by_limit_offset() {
        let q = Query::from_collection("users", "u")
            .select([("id", ref_("u.id"))])
            .order_by(ref_("u.age"), Direction::Desc)
            .limit(2)
            .offset(1)
            .build();
        let h = Harness::new(&q);
        let ids = |h: &Harness| -> Vec<i64> {
            h.values().iter().filter_map(|v| v.get("id").as_i64()).collect()
        };
        h.send(
            "u",
            vec![
                (user(1, "a", "x", 10), 1),
                (user(2, "b", "x", 40), 1),
                (user(3, "c", "x", 30), 1),
                (user(4, "d", "x", 20), 1),
            ],
        );
        assert_eq!(ids(&h), vec![3, 4]);

        h.send("u", vec![(user(5, "e", "x", 50), 1)]);
        assert_eq!(ids(&h), vec![2, 3]);
    }

    #[test]
    fn test_distinct_select() {
        let q = Query::from_collection("users", "u")
            .select([("dept", ref_("u.dept"))])
            .order_by(ref_("u.dept"), Direction::Asc)
            .distinct()
            .build();
        let h = Harness::new(&q);
        h.send(
            "u",
            vec![
                (user(1, "a", "eng", 1), 1),
                (user(2, "b", "eng", 1), 1),
                (user(3, "c", "ops", 1), 1),
            ],
        );
        let dept = |d: &str| Value::object([("dept", Value::from(d))]);
        assert_eq!(h.values(), vec![dept("eng"), dept("ops")]);

        h.send("u", vec![(user(1, "a", "eng", 1), -1)]);
        assert_eq!(h.values(), vec![dept("eng"), dept("ops")]);
        h.send("u", vec![(user(2, "b", "eng", 1), -1)]);
        assert_eq!(h.values(), vec![dept("ops")]);
    }

    #[test]
    fn test_subquery_source() {
        let adults = Query::from_collection("users", "inner_u")
            .where_(Expr::gte(ref_("inner_u.age"), val(18i64)))
            .build();
        let q = Query::from_query(adults, "a").select([("id", ref_("a.id"))]).build();
        let h = Harness::new(&q);
        h.send("inner_u", vec![(user(1, "a", "x", 12), 1), (user(2, "b", "x", 30), 1)]);
        assert_eq!(h.values(), vec![Value::object([("id", Value::Int64(2))])]);
    }

    #[test]
    fn test_missing_input_is_error() {
        let q = Query::from_collection("users", "u").build();
        let result = compile_query(&q, &CompileInputs::new());
        assert_eq!(result.err(), Some(Error::collection_not_found("users")));
    }
}
