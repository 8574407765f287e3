//! Whole-row decoding.

use crate::conversion::FromValue;
use crate::error::{Error, Result};
use crate::row::Row;

/// Trait for decoding a result row into a Rust type.
pub trait FromRow<'a>: Sized {
    /// Decode the row.
    fn from_row(row: &'a Row) -> Result<Self>;
}

impl FromRow<'_> for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

macro_rules! impl_from_row_tuple {
    ($count:literal: $($idx:tt => $T:ident),+) => {
        impl<'a, $($T: FromValue<'a>),+> FromRow<'a> for ($($T,)+) {
            fn from_row(row: &'a Row) -> Result<Self> {
                if row.len() < $count {
                    return Err(Error::Decode(format!(
                        "row has {} columns, expected at least {}",
                        row.len(),
                        $count
                    )));
                }
                Ok(($(row.get::<$T>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1: 0 => T1);
impl_from_row_tuple!(2: 0 => T1, 1 => T2);
impl_from_row_tuple!(3: 0 => T1, 1 => T2, 2 => T3);
impl_from_row_tuple!(4: 0 => T1, 1 => T2, 2 => T3, 3 => T4);
impl_from_row_tuple!(5: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5);
impl_from_row_tuple!(6: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6);
impl_from_row_tuple!(7: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7);
impl_from_row_tuple!(8: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8);
