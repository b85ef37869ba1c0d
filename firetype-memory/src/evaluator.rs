//! Query evaluation for the in-memory database.
//!
//! Filters follow managed document database semantics: a filter on a missing field never
//! matches, `==` compares integers and doubles numerically, range operators only compare
//! values of the same type, and `!=` / `not-in` exclude documents where the field is
//! missing or null. Results are ordered by the query's orderings and then by document id.

use bson::{Bson, Document, datetime::DateTime};
use std::cmp::Ordering;

use firetype_core::{
    error::{DatabaseError, DatabaseResult},
    path::{DocumentPath, FIELD_DOCUMENT_ID, lookup_field},
    query::{Cursor, Direction, Expr, FieldOp, Order, Query, QueryVisitor},
};

/// Comparable representation of BSON values.
///
/// Integers compare exactly with each other; an integer and a double compare by numeric
/// value without rounding the integer. Values of different types order by type: null,
/// booleans, numbers, datetimes, timestamps, strings, bytes, object ids, arrays, maps,
/// decimals, then the remaining BSON types.
#[derive(Debug, Clone)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    DateTime(DateTime),
    /// BSON internal timestamp as (time, increment)
    Timestamp(u32, u32),
    String(&'a str),
    Bytes(&'a [u8]),
    ObjectId([u8; 12]),
    Array(Vec<Comparable<'a>>),
    /// Map entries sorted by key
    Map(Vec<(&'a str, Comparable<'a>)>),
    /// Ordered by encoded bytes; equal values with different exponents differ
    Decimal([u8; 16]),
    /// Any other BSON type, ordered by element type and then by its rendering
    Other(u8, String),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::Timestamp(value) => Comparable::Timestamp(value.time, value.increment),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) => Comparable::Bytes(&binary.bytes),
            Bson::ObjectId(oid) => Comparable::ObjectId(oid.bytes()),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => {
                let mut entries = doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>();
                entries.sort_by(|a, b| a.0.cmp(b.0));

                Comparable::Map(entries)
            }
            Bson::Decimal128(value) => Comparable::Decimal(value.bytes()),
            other => Comparable::Other(other.element_type() as u8, other.to_string()),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Int(_) | Comparable::Double(_) => 2,
            Comparable::DateTime(_) => 3,
            Comparable::Timestamp(..) => 4,
            Comparable::String(_) => 5,
            Comparable::Bytes(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Array(_) => 8,
            Comparable::Map(_) => 9,
            Comparable::Decimal(_) => 10,
            Comparable::Other(..) => 11,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Comparable::Null)
    }

    /// Total order over all values, types first. NaN sorts before every other number.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => cmp_doubles(*a, *b),
            (Comparable::Int(a), Comparable::Double(b)) => cmp_int_double(*a, *b),
            (Comparable::Double(a), Comparable::Int(b)) => cmp_int_double(*b, *a).reverse(),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Timestamp(a_time, a_inc), Comparable::Timestamp(b_time, b_inc)) => {
                a_time.cmp(b_time).then_with(|| a_inc.cmp(b_inc))
            }
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Decimal(a), Comparable::Decimal(b)) => a.cmp(b),
            (Comparable::Other(a_type, a), Comparable::Other(b_type, b)) => {
                a_type.cmp(b_type).then_with(|| a.cmp(b))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn cmp_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compares an integer with a double exactly.
fn cmp_int_double(int: i64, double: f64) -> Ordering {
    // 2^63 as f64; every finite double in [-2^63, 2^63) truncates to a valid i64
    const BOUND: f64 = 9_223_372_036_854_775_808.0;

    if double.is_nan() {
        return Ordering::Greater;
    }
    if double >= BOUND {
        return Ordering::Less;
    }
    if double < -BOUND {
        return Ordering::Greater;
    }

    let whole = double.trunc();
    int.cmp(&(whole as i64)).then_with(|| {
        let fraction = double - whole;
        if fraction > 0.0 {
            Ordering::Less
        } else if fraction < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Comparable<'_> {
    /// Only values of the same type are ordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.rank() == other.rank()).then(|| self.total_cmp(other))
    }
}

/// A stored document seen by the evaluator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub path: &'a DocumentPath,
    pub fields: &'a Document,
}

impl<'a> Candidate<'a> {
    fn lookup(&self, field: &str) -> Option<Comparable<'a>> {
        if field == FIELD_DOCUMENT_ID {
            return Some(Comparable::String(self.path.id()));
        }

        lookup_field(self.fields, field).map(Comparable::from)
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    candidate: Candidate<'a>,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(candidate: Candidate<'a>) -> Self {
        Self { candidate }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DatabaseResult<bool> {
        self.visit_expr(expr)
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DatabaseError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = self.candidate.lookup(field) else {
            return Ok(false);
        };
        let value = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => field_value == value,
            FieldOp::Ne => !field_value.is_null() && field_value != value,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match field_value.partial_cmp(&value) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering.is_gt(),
                        FieldOp::Gte => ordering.is_ge(),
                        FieldOp::Lt => ordering.is_lt(),
                        _ => ordering.is_le(),
                    },
                    None => false,
                }
            }
            FieldOp::ArrayContains => match &field_value {
                Comparable::Array(items) => items.iter().any(|item| item == &value),
                _ => false,
            },
            FieldOp::ArrayContainsAny => match (&field_value, &value) {
                (Comparable::Array(items), Comparable::Array(values)) => items
                    .iter()
                    .any(|item| values.contains(item)),
                _ => false,
            },
            FieldOp::In => match &value {
                Comparable::Array(values) => values.contains(&field_value),
                _ => false,
            },
            FieldOp::NotIn => match &value {
                Comparable::Array(values) => !field_value.is_null() && !values.contains(&field_value),
                _ => false,
            },
            FieldOp::Unknown(op) => return Err(unsupported_operator(op)),
        })
    }
}

fn unsupported_operator(op: &str) -> DatabaseError {
    DatabaseError::InvalidArgument(format!("unsupported query operator '{}'", op))
}

/// Rejects malformed filters and cursors before any document is scanned.
pub(crate) fn validate(query: &Query) -> DatabaseResult<()> {
    fn validate_expr(expr: &Expr) -> DatabaseResult<()> {
        match expr {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().try_for_each(validate_expr),
            Expr::Field { field, op, value } => match op {
                FieldOp::Unknown(op) => Err(unsupported_operator(op)),
                FieldOp::In | FieldOp::NotIn | FieldOp::ArrayContainsAny
                    if !matches!(value, Bson::Array(_)) =>
                {
                    Err(DatabaseError::InvalidArgument(format!(
                        "operator '{}' on field '{}' requires an array value",
                        op.as_str(),
                        field
                    )))
                }
                _ => Ok(()),
            },
        }
    }

    query.filters.iter().try_for_each(validate_expr)?;

    let orderings = effective_orders(query).len();
    for cursor in query.start.iter().chain(query.end.iter()) {
        if cursor.values.len() > orderings {
            return Err(DatabaseError::InvalidArgument(format!(
                "cursor has {} values but the query has {} orderings",
                cursor.values.len(),
                orderings
            )));
        }
    }

    Ok(())
}

/// The orderings a query runs with.
///
/// Without explicit orderings, a query with inequality filters is ordered by the filtered
/// fields in name order. The document id always ends the list, in the direction of the
/// last ordering.
fn effective_orders(query: &Query) -> Vec<Order> {
    let mut orders = query.orders.clone();

    if orders.is_empty() {
        let mut fields = Vec::new();
        for filter in &query.filters {
            collect_inequality_fields(filter, &mut fields);
        }
        fields.sort();
        fields.dedup();

        orders.extend(
            fields
                .into_iter()
                .filter(|field| field != FIELD_DOCUMENT_ID)
                .map(|field| Order { field, direction: Direction::Asc }),
        );
    }

    if !orders.iter().any(|order| order.field == FIELD_DOCUMENT_ID) {
        let direction = orders
            .last()
            .map(|order| order.direction)
            .unwrap_or_default();
        orders.push(Order { field: FIELD_DOCUMENT_ID.to_string(), direction });
    }

    orders
}

fn collect_inequality_fields(expr: &Expr, fields: &mut Vec<String>) {
    match expr {
        Expr::And(exprs) | Expr::Or(exprs) => {
            for expr in exprs {
                collect_inequality_fields(expr, fields);
            }
        }
        Expr::Field { field, op, .. } => {
            if matches!(
                op,
                FieldOp::Lt | FieldOp::Lte | FieldOp::Gt | FieldOp::Gte | FieldOp::Ne | FieldOp::NotIn
            ) {
                fields.push(field.clone());
            }
        }
    }
}

fn compare_candidates(orders: &[Order], a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    for order in orders {
        let left = a.lookup(&order.field).unwrap_or(Comparable::Null);
        let right = b.lookup(&order.field).unwrap_or(Comparable::Null);

        let ordering = match order.direction {
            Direction::Asc => left.total_cmp(&right),
            Direction::Desc => right.total_cmp(&left),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Position of `candidate` relative to `cursor`, under the query orderings.
fn compare_to_cursor(orders: &[Order], candidate: &Candidate<'_>, cursor: &Cursor) -> Ordering {
    for (order, cursor_value) in orders.iter().zip(cursor.values.iter()) {
        let left = candidate.lookup(&order.field).unwrap_or(Comparable::Null);
        let right = Comparable::from(cursor_value);

        let ordering = match order.direction {
            Direction::Asc => left.total_cmp(&right),
            Direction::Desc => right.total_cmp(&left),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies the whole query to `documents`: filters, orderings, cursors, offset, limit.
pub(crate) fn execute<'a>(
    documents: impl IntoIterator<Item = Candidate<'a>>,
    query: &Query,
) -> DatabaseResult<Vec<Candidate<'a>>> {
    validate(query)?;

    let orders = effective_orders(query);

    let mut matched = Vec::new();
    for candidate in documents {
        let mut evaluator = DocumentEvaluator::new(candidate);
        let mut keep = true;

        for filter in &query.filters {
            if !evaluator.evaluate(filter)? {
                keep = false;
                break;
            }
        }

        let has_order_fields = orders
            .iter()
            .all(|order| candidate.lookup(&order.field).is_some());

        if keep && has_order_fields {
            matched.push(candidate);
        }
    }

    matched.sort_by(|a, b| compare_candidates(&orders, a, b));

    if let Some(start) = &query.start {
        matched.retain(|candidate| match compare_to_cursor(&orders, candidate, start) {
            Ordering::Greater => true,
            Ordering::Equal => start.inclusive,
            Ordering::Less => false,
        });
    }

    if let Some(end) = &query.end {
        matched.retain(|candidate| match compare_to_cursor(&orders, candidate, end) {
            Ordering::Less => true,
            Ordering::Equal => end.inclusive,
            Ordering::Greater => false,
        });
    }

    Ok(matched
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect())
}
