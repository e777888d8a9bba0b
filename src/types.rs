//! Compile-time SQL type markers.
//!
//! Every [`Expr`](crate::expr::Expr) and [`Column`](crate::expr::Column)
//! carries one of these zero-sized markers. They never exist at runtime; their
//! only job is to let the compiler reject comparisons and arithmetic between
//! incompatible SQL types.
//!
//! A marker is either a base type ([`Integer`], [`Real`], [`Text`], [`Blob`],
//! [`Bool`]) or [`Nullable`] wrapping one. [`SqlType`] splits a marker into
//! its base and its nullness so operators can reason about each separately.

use std::marker::PhantomData;

use crate::schema::DataType;

/// A SQL value type marker.
pub trait SqlType: 'static {
    /// The marker with nullability removed.
    type Base: BaseType;
    /// Whether the marker admits NULL.
    type Null: Nullness;

    /// Human-readable marker name used in build errors.
    fn name() -> String {
        if <Self::Null as Nullness>::NULLABLE {
            format!("Nullable<{}>", <Self::Base as BaseType>::NAME)
        } else {
            <Self::Base as BaseType>::NAME.to_string()
        }
    }
}

/// A non-nullable marker with a storage affinity.
pub trait BaseType: SqlType {
    const DATA_TYPE: DataType;
    const NAME: &'static str;
}

/// Type-level nullness: either [`NotNull`] or [`MaybeNull`].
pub trait Nullness: 'static {
    const NULLABLE: bool;
    /// Nullness of an expression combining `Self` with `N`.
    type Or<N: Nullness>: Nullness;
    /// The marker for base `B` with this nullness.
    type Apply<B: BaseType>: SqlType;
}

#[derive(Debug, Clone, Copy)]
pub struct NotNull;

#[derive(Debug, Clone, Copy)]
pub struct MaybeNull;

impl Nullness for NotNull {
    const NULLABLE: bool = false;
    type Or<N: Nullness> = N;
    type Apply<B: BaseType> = B;
}

impl Nullness for MaybeNull {
    const NULLABLE: bool = true;
    type Or<N: Nullness> = MaybeNull;
    type Apply<B: BaseType> = Nullable<B>;
}

macro_rules! base_type {
    ($($(#[$doc:meta])* $name:ident => $data_type:ident),* $(,)?) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl SqlType for $name {
            type Base = $name;
            type Null = NotNull;
        }

        impl BaseType for $name {
            const DATA_TYPE: DataType = DataType::$data_type;
            const NAME: &'static str = stringify!($name);
        }
    )*};
}

base_type! {
    /// 64-bit signed integer.
    Integer => Integer,
    /// IEEE-754 double.
    Real => Real,
    /// UTF-8 text.
    Text => Text,
    /// Arbitrary bytes.
    Blob => Blob,
    /// Truth value, stored as INTEGER 0/1.
    Bool => Integer,
}

/// A marker whose values may be NULL.
#[derive(Debug, Clone, Copy)]
pub struct Nullable<B>(PhantomData<B>);

impl<B: BaseType> SqlType for Nullable<B> {
    type Base = B;
    type Null = MaybeNull;
}

/// Base types that may appear on either side of a comparison.
pub trait Comparable<Rhs: BaseType>: BaseType {}

impl Comparable<Integer> for Integer {}
impl Comparable<Real> for Integer {}
impl Comparable<Integer> for Real {}
impl Comparable<Real> for Real {}
impl Comparable<Text> for Text {}
impl Comparable<Blob> for Blob {}
impl Comparable<Bool> for Bool {}

/// Base types usable in arithmetic.
pub trait Numeric: BaseType {}

impl Numeric for Integer {}
impl Numeric for Real {}

/// Result type of an arithmetic operator between two numeric base types.
pub trait Arith<Rhs: BaseType>: Numeric {
    type Output: BaseType;
}

impl Arith<Integer> for Integer {
    type Output = Integer;
}

impl Arith<Real> for Integer {
    type Output = Real;
}

impl Arith<Integer> for Real {
    type Output = Real;
}

impl Arith<Real> for Real {
    type Output = Real;
}

/// Marker for `L op R`: the arithmetic base, nullable if either side is.
pub type ArithOutput<L, R> = <<<L as SqlType>::Null as Nullness>::Or<<R as SqlType>::Null> as Nullness>::Apply<
    <<L as SqlType>::Base as Arith<<R as SqlType>::Base>>::Output,
>;

/// Marker `T` with nullability forced on.
pub type NullableOf<T> = Nullable<<T as SqlType>::Base>;
