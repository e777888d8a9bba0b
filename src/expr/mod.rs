//! Typed expression algebra.
//!
//! An [`Expr<T>`] is an immutable expression tree tagged with a
//! [marker](crate::types) `T` describing the SQL type it produces. Combinators
//! consume their operands and return new nodes; nothing is mutated in place.
//! Operand compatibility is checked by the compiler:
//!
//! ```
//! use typed_sqlite::prelude::*;
//!
//! let age = col::<Integer>("age");
//! let name = col::<Nullable<Text>>("name");
//! let adult = age.ge(18).and(name.like("A%"));
//! ```
//!
//! Comparing text with an integer does not compile:
//!
//! ```compile_fail
//! use typed_sqlite::prelude::*;
//!
//! let age = col::<Integer>("age");
//! let _ = age.eq("eighteen");
//! ```
//!
//! Logical combinators only accept boolean expressions:
//!
//! ```compile_fail
//! use typed_sqlite::prelude::*;
//!
//! let age = col::<Integer>("age");
//! let _ = age.ge(18).and(col::<Text>("name"));
//! ```
//!
//! Arithmetic is only defined for numeric operands:
//!
//! ```compile_fail
//! use typed_sqlite::prelude::*;
//!
//! let name = col::<Text>("name");
//! let _ = &name + 1;
//! ```
//!
//! Literals never appear in rendered SQL; each becomes a `?` placeholder whose
//! value is bound in left-to-right order.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::statement::{Assignment, Direction, OrderingTerm, Select};
use crate::types::{
    Arith, ArithOutput, BaseType, Blob, Bool, Comparable, Integer, MaybeNull, NotNull, Nullable,
    Nullness, Numeric, Real, SqlType, Text,
};
use crate::value::ToValue;

pub mod func;
mod node;

pub(crate) use node::{BinaryOp, ExprNode, UnaryOp};

/// A typed SQL expression.
pub struct Expr<T> {
    pub(crate) node: ExprNode,
    marker: PhantomData<fn() -> T>,
}

impl<T> Expr<T> {
    pub(crate) fn from_node(node: ExprNode) -> Self {
        Self {
            node,
            marker: PhantomData,
        }
    }
}

impl<T> Clone for Expr<T> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<T> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expr").field(&self.node).finish()
    }
}

impl<T: SqlType> Expr<T> {
    /// A scalar subquery. The query should produce one column of type `T`.
    pub fn subquery(query: Select) -> Self {
        Self::from_node(ExprNode::Subquery(Box::new(query)))
    }

    /// `CAST(self AS <affinity of U>)`, keeping the nullability of `self`.
    pub fn cast<U: BaseType>(self) -> Expr<<T::Null as Nullness>::Apply<U>> {
        Expr::from_node(ExprNode::Cast {
            operand: Box::new(self.node),
            data_type: U::DATA_TYPE,
        })
    }
}

impl<T: SqlType<Base = Bool>> Expr<T> {
    pub fn and<R>(self, rhs: R) -> Expr<Bool>
    where
        R: AsExpr,
        R::Sql: SqlType<Base = Bool>,
    {
        Expr::from_node(ExprNode::binary(BinaryOp::And, self.node, rhs.as_expr().node))
    }

    pub fn or<R>(self, rhs: R) -> Expr<Bool>
    where
        R: AsExpr,
        R::Sql: SqlType<Base = Bool>,
    {
        Expr::from_node(ExprNode::binary(BinaryOp::Or, self.node, rhs.as_expr().node))
    }

    pub fn not(self) -> Expr<Bool> {
        Expr::from_node(ExprNode::unary(UnaryOp::Not, self.node))
    }
}

/// A typed reference to a column, optionally qualified by a table or alias.
pub struct Column<T> {
    table: Option<Arc<str>>,
    name: Arc<str>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Column<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            name: self.name.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("table", &self.table)
            .field("name", &self.name)
            .finish()
    }
}

/// An unqualified column reference, resolved against whatever sources the
/// statement makes visible.
pub fn col<T: SqlType>(name: &str) -> Column<T> {
    Column {
        table: None,
        name: name.into(),
        marker: PhantomData,
    }
}

/// Raw SQL spliced verbatim into the statement. Not column-checked and not
/// parameterized; never build it from untrusted input.
pub fn sql<T: SqlType>(raw: impl Into<String>) -> Expr<T> {
    Expr::from_node(ExprNode::Raw(raw.into()))
}

/// `EXISTS (query)`.
pub fn exists(query: Select) -> Expr<Bool> {
    Expr::from_node(ExprNode::Exists(Box::new(query)))
}

impl<T: SqlType> Column<T> {
    pub(crate) fn qualified(table: Arc<str>, name: Arc<str>) -> Self {
        Self {
            table: Some(table),
            name,
            marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn expr(&self) -> Expr<T> {
        Expr::from_node(ExprNode::Column {
            table: self.table.clone(),
            name: self.name.clone(),
        })
    }

    /// Assignment of `value` to this column for INSERT and UPDATE. A nullable
    /// value cannot be assigned to a NOT NULL column.
    pub fn to<V>(&self, value: V) -> Assignment
    where
        V: AsExpr,
        T::Base: Comparable<<V::Sql as SqlType>::Base>,
        <V::Sql as SqlType>::Null: AssignableTo<T::Null>,
    {
        Assignment::new(self.table.clone(), self.name.clone(), value.as_expr().node)
    }
}

/// Nullness that may be stored into a column of nullness `N`.
pub trait AssignableTo<N: Nullness>: Nullness {}

impl AssignableTo<NotNull> for NotNull {}
impl AssignableTo<MaybeNull> for NotNull {}
impl AssignableTo<MaybeNull> for MaybeNull {}

/// Conversion into a typed expression: expressions, column references and
/// Rust literals.
pub trait AsExpr {
    type Sql: SqlType;
    fn as_expr(self) -> Expr<Self::Sql>;
}

impl<T: SqlType> AsExpr for Expr<T> {
    type Sql = T;
    fn as_expr(self) -> Expr<T> {
        self
    }
}

impl<T: SqlType> AsExpr for &Expr<T> {
    type Sql = T;
    fn as_expr(self) -> Expr<T> {
        self.clone()
    }
}

impl<T: SqlType> AsExpr for &Column<T> {
    type Sql = T;
    fn as_expr(self) -> Expr<T> {
        self.expr()
    }
}

// Operators stay on `&Column<T>` only, so calling one never moves the handle.
impl<T: SqlType> AsExpr for Column<T> {
    type Sql = T;
    fn as_expr(self) -> Expr<T> {
        self.expr()
    }
}

macro_rules! literal_expr {
    ($($ty:ty => $marker:ty),* $(,)?) => {$(
        impl AsExpr for $ty {
            type Sql = $marker;
            fn as_expr(self) -> Expr<$marker> {
                Expr::from_node(ExprNode::Literal(self.to_value()))
            }
        }

        impl AsExpr for Option<$ty> {
            type Sql = Nullable<$marker>;
            fn as_expr(self) -> Expr<Nullable<$marker>> {
                Expr::from_node(ExprNode::Literal(self.to_value()))
            }
        }
    )*};
}

literal_expr! {
    i64 => Integer,
    i32 => Integer,
    i16 => Integer,
    i8 => Integer,
    u32 => Integer,
    u16 => Integer,
    u8 => Integer,
    f64 => Real,
    f32 => Real,
    bool => Bool,
    &str => Text,
    String => Text,
    &String => Text,
    Vec<u8> => Blob,
    &[u8] => Blob,
    NaiveDate => Text,
    NaiveDateTime => Text,
    DateTime<Utc> => Text,
}

type BaseOf<E> = <<E as AsExpr>::Sql as SqlType>::Base;
type NullOf<E> = <<E as AsExpr>::Sql as SqlType>::Null;

/// Operators shared by expressions and column references.
pub trait ExprOps: AsExpr + Sized {
    fn eq<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Eq, self, rhs)
    }

    fn ne<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Ne, self, rhs)
    }

    fn lt<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Lt, self, rhs)
    }

    fn le<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Le, self, rhs)
    }

    fn gt<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Gt, self, rhs)
    }

    fn ge<R: AsExpr>(self, rhs: R) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        compare(BinaryOp::Ge, self, rhs)
    }

    fn is_null(self) -> Expr<Bool> {
        Expr::from_node(ExprNode::unary(UnaryOp::IsNull, self.as_expr().node))
    }

    fn is_not_null(self) -> Expr<Bool> {
        Expr::from_node(ExprNode::unary(UnaryOp::IsNotNull, self.as_expr().node))
    }

    fn in_list<I, R>(self, values: I) -> Expr<Bool>
    where
        I: IntoIterator<Item = R>,
        R: AsExpr,
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        membership(self, values, false)
    }

    fn not_in_list<I, R>(self, values: I) -> Expr<Bool>
    where
        I: IntoIterator<Item = R>,
        R: AsExpr,
        BaseOf<Self>: Comparable<BaseOf<R>>,
    {
        membership(self, values, true)
    }

    /// `self IN (query)`. The query should select a single column.
    fn in_query(self, query: Select) -> Expr<Bool> {
        Expr::from_node(ExprNode::InQuery {
            operand: Box::new(self.as_expr().node),
            query: Box::new(query),
            negated: false,
        })
    }

    fn not_in_query(self, query: Select) -> Expr<Bool> {
        Expr::from_node(ExprNode::InQuery {
            operand: Box::new(self.as_expr().node),
            query: Box::new(query),
            negated: true,
        })
    }

    fn between<L: AsExpr, H: AsExpr>(self, low: L, high: H) -> Expr<Bool>
    where
        BaseOf<Self>: Comparable<BaseOf<L>> + Comparable<BaseOf<H>>,
    {
        Expr::from_node(ExprNode::Between {
            operand: Box::new(self.as_expr().node),
            low: Box::new(low.as_expr().node),
            high: Box::new(high.as_expr().node),
        })
    }

    fn like<R: AsExpr>(self, pattern: R) -> Expr<Bool>
    where
        Self::Sql: SqlType<Base = Text>,
        R::Sql: SqlType<Base = Text>,
    {
        Expr::from_node(ExprNode::binary(
            BinaryOp::Like,
            self.as_expr().node,
            pattern.as_expr().node,
        ))
    }

    fn glob<R: AsExpr>(self, pattern: R) -> Expr<Bool>
    where
        Self::Sql: SqlType<Base = Text>,
        R::Sql: SqlType<Base = Text>,
    {
        Expr::from_node(ExprNode::binary(
            BinaryOp::Glob,
            self.as_expr().node,
            pattern.as_expr().node,
        ))
    }

    /// Text concatenation, `self || rhs`.
    fn concat<R: AsExpr>(self, rhs: R) -> Expr<<<NullOf<Self> as Nullness>::Or<NullOf<R>> as Nullness>::Apply<Text>>
    where
        Self::Sql: SqlType<Base = Text>,
        R::Sql: SqlType<Base = Text>,
    {
        Expr::from_node(ExprNode::binary(
            BinaryOp::Concat,
            self.as_expr().node,
            rhs.as_expr().node,
        ))
    }

    fn asc(self) -> OrderingTerm {
        OrderingTerm::new(self.as_expr().node, Direction::Asc)
    }

    fn desc(self) -> OrderingTerm {
        OrderingTerm::new(self.as_expr().node, Direction::Desc)
    }
}

impl<T: SqlType> ExprOps for Expr<T> {}
impl<T: SqlType> ExprOps for &Column<T> {}

fn compare<L: AsExpr, R: AsExpr>(op: BinaryOp, lhs: L, rhs: R) -> Expr<Bool> {
    Expr::from_node(ExprNode::binary(op, lhs.as_expr().node, rhs.as_expr().node))
}

fn membership<L, I, R>(lhs: L, values: I, negated: bool) -> Expr<Bool>
where
    L: AsExpr,
    I: IntoIterator<Item = R>,
    R: AsExpr,
{
    Expr::from_node(ExprNode::InList {
        operand: Box::new(lhs.as_expr().node),
        list: values.into_iter().map(|v| v.as_expr().node).collect(),
        negated,
    })
}

macro_rules! arith_op {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {$(
        impl<L, R> $trait<R> for Expr<L>
        where
            L: SqlType,
            R: AsExpr,
            L::Base: Arith<BaseOf<R>>,
        {
            type Output = Expr<ArithOutput<L, R::Sql>>;

            fn $method(self, rhs: R) -> Self::Output {
                Expr::from_node(ExprNode::binary(BinaryOp::$op, self.node, rhs.as_expr().node))
            }
        }

        impl<L, R> $trait<R> for &Column<L>
        where
            L: SqlType,
            R: AsExpr,
            L::Base: Arith<BaseOf<R>>,
        {
            type Output = Expr<ArithOutput<L, R::Sql>>;

            fn $method(self, rhs: R) -> Self::Output {
                Expr::from_node(ExprNode::binary(BinaryOp::$op, self.expr().node, rhs.as_expr().node))
            }
        }
    )*};
}

arith_op! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
}

impl<T> Neg for Expr<T>
where
    T: SqlType,
    T::Base: Numeric,
{
    type Output = Expr<T>;

    fn neg(self) -> Expr<T> {
        Expr::from_node(ExprNode::unary(UnaryOp::Neg, self.node))
    }
}

impl<T, R> BitAnd<R> for Expr<T>
where
    T: SqlType<Base = Bool>,
    R: AsExpr,
    R::Sql: SqlType<Base = Bool>,
{
    type Output = Expr<Bool>;

    fn bitand(self, rhs: R) -> Expr<Bool> {
        self.and(rhs)
    }
}

impl<T, R> BitOr<R> for Expr<T>
where
    T: SqlType<Base = Bool>,
    R: AsExpr,
    R::Sql: SqlType<Base = Bool>,
{
    type Output = Expr<Bool>;

    fn bitor(self, rhs: R) -> Expr<Bool> {
        self.or(rhs)
    }
}

impl<T: SqlType<Base = Bool>> Not for Expr<T> {
    type Output = Expr<Bool>;

    fn not(self) -> Expr<Bool> {
        Expr::from_node(ExprNode::unary(UnaryOp::Not, self.node))
    }
}
