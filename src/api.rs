pub(crate) mod criteria_field;
pub(crate) mod segment;
pub(crate) mod segment_mutation;
pub(crate) mod segment_stat;

use std::fmt::Display;

use async_graphql::{
    types::connection::{Connection, Edge, EmptyFields},
    EmptySubscription, InputValueError, InputValueResult, MergedObject, OutputType, Result, Scalar,
    ScalarType, Value,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{outbound::Backend, store::Store};

/// The default page size for connections when neither `first` nor `last` is provided.
const DEFAULT_PAGE_SIZE: usize = 100;

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(
    segment::SegmentQuery,
    segment_stat::SegmentStatQuery,
    criteria_field::CriteriaFieldQuery,
);

#[derive(Default, MergedObject)]
pub(crate) struct Mutation(segment_mutation::SegmentMutation);

pub(crate) type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub(crate) struct DateTimeUtc(pub(crate) DateTime<Utc>);

#[Scalar]
impl ScalarType for DateTimeUtc {
    fn parse(value: Value) -> InputValueResult<Self> {
        match &value {
            Value::String(s) => Ok(DateTimeUtc(
                DateTime::parse_from_rfc3339(s)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| InputValueError::custom(e.to_string()))?,
            )),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

pub(crate) fn schema(store: Store, backend: Backend) -> Schema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(store)
        .data(backend)
        .finish()
}

/// Cursor pagination over an already reconciled, already ordered list. Same
/// argument rules as a relay connection: `after`+`first` page forward,
/// `before`+`last` page backward, mixing the two is an error.
pub(crate) fn paginate<N>(
    nodes: Vec<N>,
    after: Option<String>,
    before: Option<String>,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<Connection<String, N, EmptyFields, EmptyFields>>
where
    N: Display + OutputType,
{
    let (page, has_previous, has_next) = if let Some(before) = before {
        if after.is_some() {
            return Err("cannot use both `after` and `before`".into());
        }
        if first.is_some() {
            return Err("'before' and 'first' cannot be specified simultaneously".into());
        }
        let last = last.unwrap_or(DEFAULT_PAGE_SIZE);
        let end = cursor_position(&nodes, &before)?;
        let start = end.saturating_sub(last);
        let page: Vec<N> = take_range(nodes, start, end);
        (page, start > 0, false)
    } else if let Some(after) = after {
        if last.is_some() {
            return Err("'after' and 'last' cannot be specified simultaneously".into());
        }
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let start = cursor_position(&nodes, &after)? + 1;
        let end = nodes.len().min(start + first);
        let has_next = end < nodes.len();
        let page: Vec<N> = take_range(nodes, start, end);
        (page, false, has_next)
    } else if let Some(last) = last {
        if first.is_some() {
            return Err("first and last cannot be used together".into());
        }
        let end = nodes.len();
        let start = end.saturating_sub(last);
        let page: Vec<N> = take_range(nodes, start, end);
        (page, start > 0, false)
    } else {
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let end = nodes.len().min(first);
        let has_next = end < nodes.len();
        let page: Vec<N> = take_range(nodes, 0, end);
        (page, false, has_next)
    };
    Ok(connect_cursor(page, has_previous, has_next))
}

fn take_range<N>(nodes: Vec<N>, start: usize, end: usize) -> Vec<N> {
    nodes
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

fn cursor_position<N: Display>(nodes: &[N], cursor: &str) -> Result<usize> {
    let decoded = general_purpose::STANDARD.decode(cursor)?;
    let decoded = String::from_utf8(decoded).map_err(|e| format!("invalid cursor: {e}"))?;
    nodes
        .iter()
        .position(|n| format!("{n}") == decoded)
        .ok_or_else(|| "unknown cursor".into())
}

fn connect_cursor<N>(
    page: Vec<N>,
    prev: bool,
    next: bool,
) -> Connection<String, N, EmptyFields, EmptyFields>
where
    N: OutputType + Display,
{
    let mut connection: Connection<String, N, EmptyFields, EmptyFields> =
        Connection::new(prev, next);
    for output in page {
        connection.edges.push(Edge::new(
            general_purpose::STANDARD.encode(format!("{output}")),
            output,
        ));
    }
    connection
}

#[cfg(test)]
pub(crate) struct TestSchema {
    pub(crate) store: Store,
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    pub(crate) fn new() -> Self {
        let store = Store::new();
        let backend =
            Backend::new("http://127.0.0.1:9", None).expect("client for tests");
        let schema = schema(store.clone(), backend);
        Self { store, schema }
    }

    pub(crate) async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }
}
