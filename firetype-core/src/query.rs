//! Query construction for collection reads.
//!
//! A [`Query`] is an immutable description of the constraints accumulated on a
//! [`CollectionRef`](crate::collection::CollectionRef): filters, orderings, cursors, offset
//! and limit. The query is never validated locally; it is handed to the backend on a
//! terminal `get`, and the backend rejects what it does not support.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static constructors for field filters:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `is_in`, `not_in`
//! - Array: `array_contains`, `array_contains_any`
//! - Logical: `and`, `or`
//!
//! ```ignore
//! use firetype::query::Filter;
//!
//! let expr = Filter::eq("state", "CA").or(Filter::gte("population", 1_000_000));
//! let big_or_californian = db.collection("cities").where_filter(expr);
//! ```

use bson::Bson;

use crate::error::DatabaseError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Ordering specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// The field path to order by.
    pub field: String,
    /// The sort direction.
    pub direction: Direction,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOp {
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>=`
    Gte,
    /// `>`
    Gt,
    /// `array-contains`: the array field holds the value.
    ArrayContains,
    /// `array-contains-any`: the array field holds any of the listed values.
    ArrayContainsAny,
    /// `in`: the field equals any of the listed values.
    In,
    /// `not-in`: the field equals none of the listed values.
    NotIn,
    /// An operator string the wrapper does not recognize, kept verbatim for the backend.
    Unknown(String),
}

impl FieldOp {
    /// Returns the operator in its string form.
    pub fn as_str(&self) -> &str {
        match self {
            FieldOp::Lt => "<",
            FieldOp::Lte => "<=",
            FieldOp::Eq => "==",
            FieldOp::Ne => "!=",
            FieldOp::Gte => ">=",
            FieldOp::Gt => ">",
            FieldOp::ArrayContains => "array-contains",
            FieldOp::ArrayContainsAny => "array-contains-any",
            FieldOp::In => "in",
            FieldOp::NotIn => "not-in",
            FieldOp::Unknown(op) => op,
        }
    }
}

impl From<&str> for FieldOp {
    fn from(op: &str) -> Self {
        match op {
            "<" => FieldOp::Lt,
            "<=" => FieldOp::Lte,
            "==" => FieldOp::Eq,
            "!=" => FieldOp::Ne,
            ">=" => FieldOp::Gte,
            ">" => FieldOp::Gt,
            "array-contains" => FieldOp::ArrayContains,
            "array-contains-any" => FieldOp::ArrayContainsAny,
            "in" => FieldOp::In,
            "not-in" => FieldOp::NotIn,
            other => FieldOp::Unknown(other.to_string()),
        }
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`) to build composite
/// filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: impl Into<FieldOp>, value: impl Into<Bson>) -> Self {
        Expr::Field {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }
}

/// Helper struct for constructing filter expressions.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lte, value)
    }

    /// Matches documents whose field equals one of `values`.
    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(field, FieldOp::In, list(values))
    }

    /// Matches documents whose field is present, not null, and equals none of `values`.
    pub fn not_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(field, FieldOp::NotIn, list(values))
    }

    /// Matches documents whose array field holds `value`.
    pub fn array_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::ArrayContains, value)
    }

    /// Matches documents whose array field holds any of `values`.
    pub fn array_contains_any(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> Expr {
        Expr::field(field, FieldOp::ArrayContainsAny, list(values))
    }

    /// Creates a logical AND filter expression.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Creates a logical OR filter expression.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

fn list(values: impl IntoIterator<Item = impl Into<Bson>>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}

/// A query cursor: a position in the ordered result set given by order-by values.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Values matched position-wise against the query's orderings.
    pub values: Vec<Bson>,
    /// Whether a document sitting exactly at the cursor is part of the result.
    pub inclusive: bool,
}

/// The constraints accumulated on a collection reference.
///
/// All filters are combined with AND. The value is built by the
/// [`CollectionRef`](crate::collection::CollectionRef) chain and is only ever extended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter expressions, all of which must match.
    pub filters: Vec<Expr>,
    /// Orderings, applied in sequence.
    pub orders: Vec<Order>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Where the result set starts.
    pub start: Option<Cursor>,
    /// Where the result set ends.
    pub end: Option<Cursor>,
}

impl Query {
    /// Creates a new empty query with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(Order { field: field.into(), direction });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_start(mut self, values: Vec<Bson>, inclusive: bool) -> Self {
        self.start = Some(Cursor { values, inclusive });
        self
    }

    pub fn with_end(mut self, values: Vec<Bson>, inclusive: bool) -> Self {
        self.end = Some(Cursor { values, inclusive });
        self
    }

    /// Whether the query places no constraint at all on the collection.
    pub fn is_unconstrained(&self) -> bool {
        self == &Query::default()
    }
}

/// Visitor over filter expressions, implemented by backends that evaluate or translate
/// queries.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DatabaseError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
