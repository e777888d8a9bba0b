use std::sync::Arc;

use crate::error::QueryBuildError;
use crate::schema::DataType;
use crate::statement::{Scope, Select, SqlWriter};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Like,
    Glob,
    Concat,
}

impl BinaryOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Like => "LIKE",
            Self::Glob => "GLOB",
            Self::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Untyped expression tree. [`Expr`](super::Expr) wraps one of these with a
/// marker; rendering only ever sees the untyped form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprNode {
    Column {
        table: Option<Arc<str>>,
        name: Arc<str>,
    },
    Literal(Value),
    Raw(String),
    CountStar,
    Binary {
        op: BinaryOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprNode>,
    },
    Function {
        name: &'static str,
        args: Vec<ExprNode>,
        distinct: bool,
    },
    InList {
        operand: Box<ExprNode>,
        list: Vec<ExprNode>,
        negated: bool,
    },
    InQuery {
        operand: Box<ExprNode>,
        query: Box<Select>,
        negated: bool,
    },
    Between {
        operand: Box<ExprNode>,
        low: Box<ExprNode>,
        high: Box<ExprNode>,
    },
    Exists(Box<Select>),
    Subquery(Box<Select>),
    Cast {
        operand: Box<ExprNode>,
        data_type: DataType,
    },
}

impl ExprNode {
    pub(crate) fn binary(op: BinaryOp, left: ExprNode, right: ExprNode) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn unary(op: UnaryOp, operand: ExprNode) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub(crate) fn function(name: &'static str, args: Vec<ExprNode>) -> Self {
        Self::Function {
            name,
            args,
            distinct: false,
        }
    }

    /// Combines an optional existing predicate with `next` using AND.
    pub(crate) fn conjoin(existing: Option<ExprNode>, next: ExprNode) -> ExprNode {
        match existing {
            Some(prev) => Self::binary(BinaryOp::And, prev, next),
            None => next,
        }
    }

    /// The output name the engine gives this expression in a result set,
    /// when it is predictable.
    pub(crate) fn output_name(&self) -> Option<Arc<str>> {
        match self {
            Self::Column { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// Renders the node. Compound nodes are parenthesized unconditionally so
    /// nesting never depends on operator precedence.
    pub(crate) fn write(&self, w: &mut SqlWriter, scope: &Scope<'_>) -> Result<(), QueryBuildError> {
        match self {
            Self::Column { table, name } => {
                scope.resolve(table.as_deref(), name)?;
                w.qualified(table.as_deref(), name);
            }
            Self::Literal(value) => w.literal(value),
            Self::Raw(sql) => w.push(sql),
            Self::CountStar => w.push("count(*)"),
            Self::Binary { op, left, right } => {
                w.push("(");
                left.write(w, scope)?;
                w.push(" ");
                w.push(op.as_sql());
                w.push(" ");
                right.write(w, scope)?;
                w.push(")");
            }
            Self::Unary { op, operand } => {
                w.push("(");
                match op {
                    UnaryOp::Not => {
                        w.push("NOT ");
                        operand.write(w, scope)?;
                    }
                    UnaryOp::Neg => {
                        w.push("- ");
                        operand.write(w, scope)?;
                    }
                    UnaryOp::IsNull => {
                        operand.write(w, scope)?;
                        w.push(" IS NULL");
                    }
                    UnaryOp::IsNotNull => {
                        operand.write(w, scope)?;
                        w.push(" IS NOT NULL");
                    }
                }
                w.push(")");
            }
            Self::Function {
                name,
                args,
                distinct,
            } => {
                w.push(name);
                w.push("(");
                if *distinct {
                    w.push("DISTINCT ");
                }
                w.list(args, |w, arg| arg.write(w, scope))?;
                w.push(")");
            }
            Self::InList {
                operand,
                list,
                negated,
            } => {
                w.push("(");
                operand.write(w, scope)?;
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                w.list(list, |w, item| item.write(w, scope))?;
                w.push("))");
            }
            Self::InQuery {
                operand,
                query,
                negated,
            } => {
                w.push("(");
                operand.write(w, scope)?;
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                query.write(w, Some(scope))?;
                w.push("))");
            }
            Self::Between { operand, low, high } => {
                w.push("(");
                operand.write(w, scope)?;
                w.push(" BETWEEN ");
                low.write(w, scope)?;
                w.push(" AND ");
                high.write(w, scope)?;
                w.push(")");
            }
            Self::Exists(query) => {
                w.push("EXISTS (");
                query.write(w, Some(scope))?;
                w.push(")");
            }
            Self::Subquery(query) => {
                w.push("(");
                query.write(w, Some(scope))?;
                w.push(")");
            }
            Self::Cast { operand, data_type } => {
                w.push("CAST(");
                operand.write(w, scope)?;
                w.push(" AS ");
                w.push(data_type.as_sql());
                w.push(")");
            }
        }
        Ok(())
    }
}
