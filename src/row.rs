//! Result rows and typed row decoding.

use std::collections::HashMap;

use crate::error::{DecodeError, Result};
use crate::value::{extract, FromValue, StorageClass, Value};

/// One row of a result set, valid until the cursor advances.
///
/// Values are converted on access; reading one column never touches the
/// others.
pub struct Row<'a> {
    inner: &'a rusqlite::Row<'a>,
    columns: &'a [String],
}

impl<'a> Row<'a> {
    pub(crate) fn new(inner: &'a rusqlite::Row<'a>, columns: &'a [String]) -> Self {
        Self { inner, columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        self.columns
    }

    /// The raw value at `idx`.
    pub fn value(&self, idx: usize) -> Result<Value> {
        if idx >= self.columns.len() {
            return Err(DecodeError::ColumnIndexOutOfRange {
                index: idx,
                count: self.columns.len(),
            }
            .into());
        }
        Ok(Value::try_from(self.inner.get_ref(idx)?)?)
    }

    pub fn storage_class(&self, idx: usize) -> Result<StorageClass> {
        Ok(self.value(idx)?.storage_class())
    }

    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        Ok(extract(self.value(idx)?)?)
    }

    /// Reads the column called `name`. Matching is case-sensitive and the
    /// first column with that name wins.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DecodeError::UnknownColumn(name.to_string()))?;
        self.get(idx)
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.columns.len()).map(|idx| self.value(idx)).collect()
    }

    /// The row as a column name to value map. Later duplicates of a column
    /// name overwrite earlier ones.
    pub fn to_map(&self) -> Result<HashMap<String, Value>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| Ok((name.clone(), self.value(idx)?)))
            .collect()
    }
}

/// Decodes a whole row into a host type.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> Result<Self>;
}

impl FromRow for Vec<Value> {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        row.values()
    }
}

impl FromRow for HashMap<String, Value> {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        row.to_map()
    }
}

macro_rules! tuple_from_row {
    ($($name:ident: $idx:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &Row<'_>) -> Result<Self> {
                Ok(($(row.get::<$name>($idx)?,)+))
            }
        }
    };
}

tuple_from_row!(A: 0);
tuple_from_row!(A: 0, B: 1);
tuple_from_row!(A: 0, B: 1, C: 2);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
