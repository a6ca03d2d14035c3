//! Record capability
//!
//! A record type describes its own shape once through [`Record::fields`] and gives
//! by-name access to its fields. The mapper derives a table mapping from that shape
//! when the type is registered, so no type inspection happens per call.
//!
//! Lifecycle hooks are an optional capability: a record exposes them through
//! [`Record::hooks`], which returns `None` unless the type opts in.

use super::context::Context;
use super::database::SqlExecutor;
use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::TypeId;

/// Abstract column type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// `bool`
    Bool,
    /// `i16`
    SmallInt,
    /// `i32`
    Int,
    /// `i64`
    BigInt,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `String`
    Text,
    /// `Vec<u8>`
    Bytes,
    /// `chrono::DateTime<Utc>`
    Timestamp,
}

impl FieldKind {
    /// Check if values of this kind can serve as generated keys
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::SmallInt | FieldKind::Int | FieldKind::BigInt)
    }
}

/// A Rust type that can be stored in a single column
pub trait ColumnValue: Sized {
    /// Column type the value maps to
    const KIND: FieldKind;
    /// Whether the column accepts NULL
    const NULLABLE: bool = false;

    /// Convert the field into a statement argument
    fn to_value(&self) -> DatabaseValue;

    /// Convert a fetched value back into the field type
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when the value cannot represent this type.
    fn from_value(value: DatabaseValue) -> Result<Self>;
}

fn mismatch(expected: &str, value: &DatabaseValue) -> DatabaseError {
    DatabaseError::type_mismatch(expected, value.type_name())
}

macro_rules! column_value {
    ($ty:ty, $kind:ident, $name:literal, |$v:ident| $read:expr) => {
        impl ColumnValue for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn to_value(&self) -> DatabaseValue {
                DatabaseValue::from(self.clone())
            }

            fn from_value($v: DatabaseValue) -> Result<Self> {
                let read: Option<$ty> = $read;
                read.ok_or_else(|| mismatch($name, &$v))
            }
        }
    };
}

column_value!(bool, Bool, "bool", |value| value.as_bool());
column_value!(i16, SmallInt, "i16", |value| value
    .as_long()
    .and_then(|v| i16::try_from(v).ok()));
column_value!(i32, Int, "i32", |value| value.as_int());
column_value!(i64, BigInt, "i64", |value| value.as_long());
column_value!(f32, Float, "f32", |value| value.as_float());
column_value!(f64, Double, "f64", |value| value.as_double());
column_value!(DateTime<Utc>, Timestamp, "timestamp", |value| value
    .as_timestamp());

impl ColumnValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::String(self.clone())
    }

    fn from_value(value: DatabaseValue) -> Result<Self> {
        match value {
            DatabaseValue::String(s) => Ok(s),
            DatabaseValue::Bytes(b) => {
                String::from_utf8(b).map_err(|_| DatabaseError::type_mismatch("String", "bytes"))
            }
            DatabaseValue::Null => Err(mismatch("String", &value)),
            other => Ok(other.as_string()),
        }
    }
}

impl ColumnValue for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Bytes(self.clone())
    }

    fn from_value(value: DatabaseValue) -> Result<Self> {
        match value {
            DatabaseValue::Bytes(b) => Ok(b),
            DatabaseValue::String(s) => Ok(s.into_bytes()),
            other => Err(mismatch("Vec<u8>", &other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> DatabaseValue {
        match self {
            Some(v) => v.to_value(),
            None => DatabaseValue::Null,
        }
    }

    fn from_value(value: DatabaseValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// One declared field of a record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field identifier
    pub name: &'static str,
    /// Explicit column name, overriding the lower-cased field name
    pub column: Option<&'static str>,
    /// Column type
    pub kind: FieldKind,
    /// Whether the field is a nullable wrapper
    pub nullable: bool,
}

impl FieldDef {
    /// Describe a field of type `T`
    pub fn of<T: ColumnValue>(name: &'static str, column: Option<&'static str>) -> Self {
        Self {
            name,
            column,
            kind: T::KIND,
            nullable: T::NULLABLE,
        }
    }
}

/// A value the mapper can persist
///
/// Usually implemented through [`impl_record!`](crate::impl_record). Fields left
/// out of [`Record::fields`] are ignored by the mapper and keep their `Default`
/// value when a record is loaded.
pub trait Record: Send + Sync + 'static {
    /// Declared fields, in declaration order
    fn fields() -> Vec<FieldDef>
    where
        Self: Sized;

    /// Read a field by identifier
    fn get_field(&self, field: &str) -> Option<DatabaseValue>;

    /// Write a field by identifier
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an unknown field and `TypeMismatch` when the
    /// value does not fit the field.
    fn set_field(&mut self, field: &str, value: DatabaseValue) -> Result<()>;

    /// Lifecycle hooks this record implements, if any
    fn hooks(&mut self) -> Option<&mut dyn Hooks> {
        None
    }

    /// Identity of the concrete record type
    fn record_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Name of the concrete record type
    fn record_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Optional lifecycle callbacks
///
/// Every method defaults to doing nothing. Pre-hooks run before the statement is
/// built and may change the record; an error from a pre-hook aborts the call
/// and is returned unchanged. Post-hooks run after the statement succeeded.
#[allow(unused_variables)]
#[async_trait]
pub trait Hooks: Send {
    async fn pre_insert(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn post_insert(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn pre_update(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn post_update(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn pre_delete(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn post_delete(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }

    async fn post_get(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        Ok(())
    }
}

/// Implement [`Record`] for a struct by listing its mapped fields
///
/// Each entry is `field: Type`, optionally followed by `=> "column"` to override
/// the column name. Fields not listed are ignored. Add `with hooks` after the type
/// name when the type implements [`Hooks`].
///
/// ```
/// use rust_dbmap::impl_record;
///
/// #[derive(Debug, Default)]
/// struct Invoice {
///     id: i64,
///     created: i64,
///     memo: String,
///     paid: Option<bool>,
///     scratch: u8,
/// }
///
/// impl_record!(Invoice {
///     id: i64,
///     created: i64 => "date_created",
///     memo: String,
///     paid: Option<bool>,
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    (@hooks true) => {
        fn hooks(&mut self) -> ::std::option::Option<&mut dyn $crate::core::record::Hooks> {
            ::std::option::Option::Some(self)
        }
    };
    (@hooks false) => {};
    (@column) => {
        ::std::option::Option::None
    };
    (@column $column:literal) => {
        ::std::option::Option::Some($column)
    };
    (@record $ty:ident, $hooks:tt, { $($field:ident : $fty:ty $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::core::record::Record for $ty {
            fn fields() -> ::std::vec::Vec<$crate::core::record::FieldDef> {
                ::std::vec![
                    $(
                        $crate::core::record::FieldDef::of::<$fty>(
                            stringify!($field),
                            $crate::impl_record!(@column $($column)?),
                        )
                    ),*
                ]
            }

            fn get_field(&self, field: &str) -> ::std::option::Option<$crate::core::value::DatabaseValue> {
                match field {
                    $(
                        stringify!($field) => ::std::option::Option::Some(
                            <$fty as $crate::core::record::ColumnValue>::to_value(&self.$field),
                        ),
                    )*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                field: &str,
                value: $crate::core::value::DatabaseValue,
            ) -> $crate::core::error::Result<()> {
                match field {
                    $(
                        stringify!($field) => {
                            self.$field = <$fty as $crate::core::record::ColumnValue>::from_value(value)?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => ::std::result::Result::Err($crate::core::error::DatabaseError::configuration(
                        format!("{} has no mapped field {}", stringify!($ty), field),
                    )),
                }
            }

            $crate::impl_record!(@hooks $hooks);
        }
    };
    ($ty:ident with hooks { $($fields:tt)* }) => {
        $crate::impl_record!(@record $ty, true, { $($fields)* });
    };
    ($ty:ident { $($fields:tt)* }) => {
        $crate::impl_record!(@record $ty, false, { $($fields)* });
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        id: i64,
        name: String,
        score: Option<f64>,
        ignored: u8,
    }

    crate::impl_record!(Sample {
        id: i64,
        name: String => "full_name",
        score: Option<f64>,
    });

    #[test]
    fn test_fields_in_declaration_order() {
        let fields = Sample::fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["id", "name", "score"]);
        assert_eq!(fields[1].column, Some("full_name"));
        assert_eq!(fields[2].kind, FieldKind::Double);
        assert!(fields[2].nullable);
        assert!(!fields[0].nullable);
    }

    #[test]
    fn test_get_and_set_field() {
        let mut sample = Sample::default();
        sample.set_field("id", DatabaseValue::Long(7)).unwrap();
        sample.set_field("name", "bob".into()).unwrap();
        sample.set_field("score", DatabaseValue::Null).unwrap();

        assert_eq!(sample.get_field("id"), Some(DatabaseValue::Long(7)));
        assert_eq!(sample.get_field("name"), Some(DatabaseValue::from("bob")));
        assert_eq!(sample.get_field("score"), Some(DatabaseValue::Null));
        assert_eq!(sample.get_field("ignored"), None);
        assert!(sample.hooks().is_none());

        let err = sample.set_field("ignored", DatabaseValue::Int(1)).unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn test_null_into_non_nullable_field() {
        let mut sample = Sample::default();
        let err = sample.set_field("id", DatabaseValue::Null).unwrap_err();
        assert!(matches!(err, DatabaseError::TypeMismatch { .. }));
    }

    #[test]
    fn test_column_value_conversions() {
        assert_eq!(bool::from_value(DatabaseValue::Long(1)).unwrap(), true);
        assert_eq!(i16::from_value(DatabaseValue::Long(12)).unwrap(), 12);
        assert!(i16::from_value(DatabaseValue::Long(1 << 20)).is_err());
        assert_eq!(
            String::from_value(DatabaseValue::Bytes(b"hi".to_vec())).unwrap(),
            "hi"
        );
        assert_eq!(
            Vec::<u8>::from_value(DatabaseValue::from("ab")).unwrap(),
            b"ab".to_vec()
        );
        assert_eq!(Option::<i32>::from_value(DatabaseValue::Null).unwrap(), None);
        assert_eq!(<Option<i32> as ColumnValue>::KIND, FieldKind::Int);
    }
}
