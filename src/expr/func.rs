//! Built-in SQL functions.

use super::{AsExpr, Expr, ExprNode};
use crate::types::{
    Comparable, Integer, Nullable, NullableOf, Nullness, Numeric, Real, SqlType, Text,
};

/// `count(*)`.
pub fn count_star() -> Expr<Integer> {
    Expr::from_node(ExprNode::CountStar)
}

/// `count(expr)`: non-NULL values of `expr`.
pub fn count<E: AsExpr>(expr: E) -> Expr<Integer> {
    Expr::from_node(ExprNode::function("count", vec![expr.as_expr().node]))
}

/// `count(DISTINCT expr)`.
pub fn count_distinct<E: AsExpr>(expr: E) -> Expr<Integer> {
    Expr::from_node(ExprNode::Function {
        name: "count",
        args: vec![expr.as_expr().node],
        distinct: true,
    })
}

/// `sum(expr)`; NULL over an empty set.
pub fn sum<E>(expr: E) -> Expr<NullableOf<E::Sql>>
where
    E: AsExpr,
    <E::Sql as SqlType>::Base: Numeric,
{
    Expr::from_node(ExprNode::function("sum", vec![expr.as_expr().node]))
}

/// `total(expr)`; 0.0 over an empty set.
pub fn total<E>(expr: E) -> Expr<Real>
where
    E: AsExpr,
    <E::Sql as SqlType>::Base: Numeric,
{
    Expr::from_node(ExprNode::function("total", vec![expr.as_expr().node]))
}

pub fn avg<E>(expr: E) -> Expr<Nullable<Real>>
where
    E: AsExpr,
    <E::Sql as SqlType>::Base: Numeric,
{
    Expr::from_node(ExprNode::function("avg", vec![expr.as_expr().node]))
}

pub fn min<E: AsExpr>(expr: E) -> Expr<NullableOf<E::Sql>> {
    Expr::from_node(ExprNode::function("min", vec![expr.as_expr().node]))
}

pub fn max<E: AsExpr>(expr: E) -> Expr<NullableOf<E::Sql>> {
    Expr::from_node(ExprNode::function("max", vec![expr.as_expr().node]))
}

pub fn length<E>(expr: E) -> Expr<<<E::Sql as SqlType>::Null as Nullness>::Apply<Integer>>
where
    E: AsExpr,
    E::Sql: SqlType<Base = Text>,
{
    Expr::from_node(ExprNode::function("length", vec![expr.as_expr().node]))
}

pub fn lower<E>(expr: E) -> Expr<E::Sql>
where
    E: AsExpr,
    E::Sql: SqlType<Base = Text>,
{
    Expr::from_node(ExprNode::function("lower", vec![expr.as_expr().node]))
}

pub fn upper<E>(expr: E) -> Expr<E::Sql>
where
    E: AsExpr,
    E::Sql: SqlType<Base = Text>,
{
    Expr::from_node(ExprNode::function("upper", vec![expr.as_expr().node]))
}

pub fn abs<E>(expr: E) -> Expr<E::Sql>
where
    E: AsExpr,
    <E::Sql as SqlType>::Base: Numeric,
{
    Expr::from_node(ExprNode::function("abs", vec![expr.as_expr().node]))
}

/// `coalesce(value, fallback)`: `value` unless it is NULL. The result takes
/// the fallback's marker, so a non-null fallback yields a non-null expression.
pub fn coalesce<V, F>(value: V, fallback: F) -> Expr<F::Sql>
where
    V: AsExpr,
    F: AsExpr,
    <V::Sql as SqlType>::Base: Comparable<<F::Sql as SqlType>::Base>,
{
    Expr::from_node(ExprNode::function(
        "coalesce",
        vec![value.as_expr().node, fallback.as_expr().node],
    ))
}

/// `ifnull(value, fallback)`; the two-argument form of [`coalesce`].
pub fn ifnull<V, F>(value: V, fallback: F) -> Expr<F::Sql>
where
    V: AsExpr,
    F: AsExpr,
    <V::Sql as SqlType>::Base: Comparable<<F::Sql as SqlType>::Base>,
{
    Expr::from_node(ExprNode::function(
        "ifnull",
        vec![value.as_expr().node, fallback.as_expr().node],
    ))
}

pub fn random() -> Expr<Integer> {
    Expr::from_node(ExprNode::function("random", Vec::new()))
}
