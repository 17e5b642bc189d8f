//! Purpose: Project a decoded row onto caller-owned structures by column name.
//! Exports: `FromValue`, `ScanRow`, `impl_scan_row!`.
//! Role: Replaces runtime reflection with a per-type mapping generated once per destination.
//! Invariants: Columns without a destination field are ignored; fields without a column keep their value.
//! Invariants: A failed scan leaves the destination untouched.
use std::collections::BTreeMap;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{RowRef, Value};

pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, Error>;
}

pub trait ScanRow {
    fn scan_row(&mut self, row: RowRef<'_>) -> Result<(), Error>;
}

fn required<'a>(value: &'a Value, target: &str) -> Result<&'a Value, Error> {
    value.present().ok_or_else(|| {
        Error::new(ErrorKind::Scan)
            .with_message(format!("null value for non-optional {target}"))
            .with_hint("Declare the field as Option<_> to accept absent values.")
    })
}

fn mismatch(value: &Value, target: &str) -> Error {
    Error::new(ErrorKind::Scan).with_message(format!(
        "cannot scan {} into {target}",
        value.kind_name()
    ))
}

macro_rules! integer_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, Error> {
                    let target = stringify!($ty);
                    let present = required(value, target)?;
                    let wide = present.as_i128().ok_or_else(|| mismatch(present, target))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        Error::new(ErrorKind::Scan)
                            .with_message(format!("{wide} does not fit in {target}"))
                    })
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match required(value, "f64")? {
            Value::Double(v) => Ok(*v),
            other => Err(mismatch(other, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match required(value, "f32")? {
            Value::Double(v) if v.is_finite() && v.abs() <= f64::from(f32::MAX) => Ok(*v as f32),
            Value::Double(v) => {
                Err(Error::new(ErrorKind::Scan).with_message(format!("{v} does not fit in f32")))
            }
            other => Err(mismatch(other, "f32")),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match required(value, "bool")? {
            Value::Boolean(v) => Ok(*v),
            other => Err(mismatch(other, "bool")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match required(value, "String")? {
            Value::String(bytes) => String::from_utf8(bytes.clone()).map_err(|err| {
                Error::new(ErrorKind::Scan)
                    .with_message("string32 value is not valid UTF-8")
                    .with_hint("Scan into Vec<u8> to keep raw bytes.")
                    .with_source(err)
            }),
            other => Err(mismatch(other, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match required(value, "Vec<u8>")? {
            Value::String(bytes) | Value::Yson(bytes) => Ok(bytes.clone()),
            other => Err(mismatch(other, "Vec<u8>")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, Error> {
        Ok(value.clone())
    }
}

impl ScanRow for BTreeMap<String, Value> {
    fn scan_row(&mut self, row: RowRef<'_>) -> Result<(), Error> {
        for (name, value) in row.columns() {
            self.insert(name.to_string(), value.clone());
        }
        Ok(())
    }
}

/// Implements `ScanRow` for a struct by mapping fields to column names.
///
/// ```
/// #[derive(Default)]
/// struct Event {
///     id: i64,
///     label: Option<String>,
/// }
///
/// skiff::impl_scan_row!(Event { id => "event_id", label });
/// ```
///
/// Every column is converted before any field is written, so a conversion
/// failure leaves the struct as it was.
#[macro_export]
macro_rules! impl_scan_row {
    (@munch $ty:ty; [$($done:tt)*]; $field:ident => $column:expr, $($rest:tt)*) => {
        $crate::impl_scan_row!(@munch $ty; [$($done)* ($field, $column)]; $($rest)*);
    };
    (@munch $ty:ty; [$($done:tt)*]; $field:ident => $column:expr) => {
        $crate::impl_scan_row!(@munch $ty; [$($done)* ($field, $column)];);
    };
    (@munch $ty:ty; [$($done:tt)*]; $field:ident, $($rest:tt)*) => {
        $crate::impl_scan_row!(@munch $ty; [$($done)* ($field, stringify!($field))]; $($rest)*);
    };
    (@munch $ty:ty; [$($done:tt)*]; $field:ident) => {
        $crate::impl_scan_row!(@munch $ty; [$($done)* ($field, stringify!($field))];);
    };
    (@munch $ty:ty; [$(($field:ident, $column:expr))*];) => {
        impl $crate::api::ScanRow for $ty {
            fn scan_row(
                &mut self,
                row: $crate::api::RowRef<'_>,
            ) -> ::std::result::Result<(), $crate::api::Error> {
                $(
                    let $field = match row.get($column) {
                        ::std::option::Option::Some(value) => ::std::option::Option::Some(
                            $crate::api::FromValue::from_value(value)
                                .map_err(|err| err.with_column($column))?,
                        ),
                        ::std::option::Option::None => ::std::option::Option::None,
                    };
                )*
                $(
                    if let ::std::option::Option::Some(value) = $field {
                        self.$field = value;
                    }
                )*
                ::std::result::Result::Ok(())
            }
        }
    };
    ($ty:ty { $($body:tt)* }) => {
        $crate::impl_scan_row!(@munch $ty; []; $($body)*);
    };
}

#[cfg(test)]
mod tests {
    use super::{FromValue, ScanRow};
    use crate::core::error::ErrorKind;
    use crate::core::schema::{Schema, WireType};
    use crate::core::value::{RowRef, Value};
    use std::collections::BTreeMap;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        first: Option<i64>,
        second: i64,
        label: String,
        untouched: u32,
    }

    crate::impl_scan_row!(Sample { first, second, label => "third", untouched => "not_in_schema" });

    fn schema() -> Schema {
        Schema::tuple(vec![
            Schema::optional_column("first", WireType::Int64),
            Schema::new(WireType::Int64).named("second"),
            Schema::new(WireType::String32).named("third"),
            Schema::new(WireType::Boolean).named("extra"),
        ])
    }

    fn absent() -> Value {
        Value::Variant {
            tag: 0,
            value: Box::new(Value::Nothing),
        }
    }

    #[test]
    fn integers_convert_when_in_range() {
        assert_eq!(u8::from_value(&Value::Int64(200)).expect("fits"), 200);
        let err = u8::from_value(&Value::Int64(-1)).expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Scan);
        let err = i64::from_value(&Value::Double(1.0)).expect_err("double");
        assert_eq!(err.kind(), ErrorKind::Scan);
    }

    #[test]
    fn doubles_narrow_to_f32_only_when_finite_and_in_range() {
        assert_eq!(f32::from_value(&Value::Double(1.5)).expect("fits"), 1.5);
        for bad in [f64::NAN, f64::INFINITY, f64::MAX] {
            let err = f32::from_value(&Value::Double(bad)).expect_err("out of range");
            assert_eq!(err.kind(), ErrorKind::Scan);
        }
        let err = f32::from_value(&Value::Int64(1)).expect_err("integer");
        assert_eq!(err.kind(), ErrorKind::Scan);
    }

    #[test]
    fn option_maps_absent_to_none() {
        assert_eq!(Option::<i64>::from_value(&absent()).expect("none"), None);
        let present = Value::Variant {
            tag: 1,
            value: Box::new(Value::Int64(5)),
        };
        assert_eq!(Option::<i64>::from_value(&present).expect("some"), Some(5));
        let err = i64::from_value(&absent()).expect_err("null");
        assert_eq!(err.kind(), ErrorKind::Scan);
    }

    #[test]
    fn strings_require_utf8_but_bytes_do_not() {
        let raw = Value::String(vec![0xff, 0xfe]);
        assert_eq!(String::from_value(&raw).expect_err("utf8").kind(), ErrorKind::Scan);
        assert_eq!(Vec::<u8>::from_value(&raw).expect("bytes"), vec![0xff, 0xfe]);
        assert_eq!(
            Vec::<u8>::from_value(&Value::Yson(b"#".to_vec())).expect("yson"),
            b"#".to_vec()
        );
    }

    #[test]
    fn struct_scan_matches_by_column_name() {
        let schema = schema();
        let values = vec![
            absent(),
            Value::Int64(3),
            Value::String(b"abbacaba".to_vec()),
            Value::Boolean(true),
        ];
        let mut dest = Sample {
            untouched: 11,
            ..Sample::default()
        };
        dest.scan_row(RowRef::new(&schema, &values)).expect("scan");
        assert_eq!(
            dest,
            Sample {
                first: None,
                second: 3,
                label: "abbacaba".to_string(),
                untouched: 11,
            }
        );
    }

    #[test]
    fn failed_struct_scan_leaves_destination_untouched() {
        let schema = schema();
        let values = vec![
            Value::Variant {
                tag: 1,
                value: Box::new(Value::Int64(8)),
            },
            Value::Int64(3),
            Value::String(vec![0xff]),
            Value::Boolean(true),
        ];
        let mut dest = Sample::default();
        let err = dest
            .scan_row(RowRef::new(&schema, &values))
            .expect_err("utf8");
        assert_eq!(err.kind(), ErrorKind::Scan);
        assert_eq!(err.column(), Some("third"));
        assert_eq!(dest, Sample::default());
    }

    #[test]
    fn map_scan_collects_every_named_column() {
        let schema = schema();
        let values = vec![
            absent(),
            Value::Int64(1),
            Value::String(Vec::new()),
            Value::Boolean(false),
        ];
        let mut dest = BTreeMap::new();
        dest.scan_row(RowRef::new(&schema, &values)).expect("scan");
        assert_eq!(dest.len(), 4);
        assert_eq!(dest.get("extra"), Some(&Value::Boolean(false)));
    }
}
