//! Value conversion registry.
//!
//! Maps host value kinds to one of SQLite's five storage affinities and
//! back: a single closed enum for values crossing the boundary, plus a
//! conversion layer on top of it.
//!
//! The converter table is a `HashMap` keyed by a stable `TypeId`, not a
//! dynamic-dispatch trait hierarchy: `ValueRegistry` below is that map.
//! Lookup is exact-type-only; there is no base-type fallback chain for
//! arbitrary host types because `dyn Any` does not carry enough structure in
//! Rust to walk one safely. Instead, any type that should participate in the
//! "object fallback → invariant string" path registers itself explicitly via
//! [`ValueRegistry::register_display_fallback`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;

use compact_str::CompactString;

use crate::config::{ConnectionOptions, DateTimeFormat, GuidStringFormat};
use crate::error::{Result, StoreError};

/// One of SQLite's five storage classes, carrying its payload. This is the
/// closed enum every value crossing the boundary is reduced to.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// The bind-ready shape a [`ValueRegistry`] converter produces, one step
/// closer to the native `bind_*` call than [`SqlValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Text(String),
    Int32(i32),
    Int64(i64),
    Bool(bool),
    Double(f64),
    Blob(Vec<u8>),
    /// Binds `size` zero bytes as a BLOB. Materialized host-side into a
    /// zeroed buffer at bind time rather than going through SQLite's native
    /// `sqlite3_bind_zeroblob`, since `rusqlite::types::ToSql` has no
    /// allocation-free zero-blob variant; see `ZeroBlob` below for the
    /// caller-facing marker type that requests this.
    ZeroBlob(usize),
}

impl rusqlite::types::ToSql for BoundValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value};
        Ok(match self {
            BoundValue::Null => ToSqlOutput::Owned(Value::Null),
            BoundValue::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            BoundValue::Int32(i) => ToSqlOutput::Owned(Value::Integer(*i as i64)),
            BoundValue::Int64(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            BoundValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(*b as i64)),
            BoundValue::Double(d) => ToSqlOutput::Owned(Value::Real(*d)),
            BoundValue::Blob(b) => ToSqlOutput::Owned(Value::Blob(b.clone())),
            BoundValue::ZeroBlob(n) => ToSqlOutput::Owned(Value::Blob(vec![0u8; *n])),
        })
    }
}

impl From<rusqlite::types::Value> for SqlValue {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => SqlValue::Null,
            rusqlite::types::Value::Integer(i) => SqlValue::Integer(i),
            rusqlite::types::Value::Real(r) => SqlValue::Real(r),
            rusqlite::types::Value::Text(s) => SqlValue::Text(s),
            rusqlite::types::Value::Blob(b) => SqlValue::Blob(b),
        }
    }
}

/// An immutable record passed through the conversion pipeline, carrying the
/// value being bound, the parameter index and the connection options in
/// effect. Created per bind call; never stored past it.
pub struct BindContext<'a> {
    pub value: &'a dyn Any,
    pub param_index: usize,
    pub options: &'a ConnectionOptions,
}

type Converter = dyn Fn(&BindContext) -> Result<BoundValue> + Send + Sync;

/// A named conversion from a set of host types to an affinity-compatible
/// bound value.
pub struct ValueRegistry {
    converters: HashMap<TypeId, Box<Converter>>,
    display_fallbacks: HashMap<TypeId, Box<dyn Fn(&dyn Any) -> String + Send + Sync>>,
}

impl ValueRegistry {
    fn empty() -> Self {
        Self {
            converters: HashMap::new(),
            display_fallbacks: HashMap::new(),
        }
    }

    /// Registers a converter for an exact host type `T`.
    pub fn register<T: 'static>(
        &mut self,
        f: impl Fn(&T, &ConnectionOptions) -> Result<BoundValue> + Send + Sync + 'static,
    ) {
        self.converters.insert(
            TypeId::of::<T>(),
            Box::new(move |ctx: &BindContext| {
                let v = ctx
                    .value
                    .downcast_ref::<T>()
                    .expect("registry keyed by TypeId::of::<T>()");
                f(v, ctx.options)
            }),
        );
    }

    /// Registers the "object fallback" path for a type that has no direct
    /// affinity mapping: it is bound as a culture-invariant (here: just
    /// `Display`) string.
    pub fn register_display_fallback<T: Any + std::fmt::Display + 'static>(&mut self) {
        self.display_fallbacks.insert(
            TypeId::of::<T>(),
            Box::new(|v: &dyn Any| {
                v.downcast_ref::<T>()
                    .expect("fallback keyed by TypeId::of::<T>()")
                    .to_string()
            }),
        );
    }

    /// Converts a host value into its bound form. Lookup rule: exact type
    /// match, then the registered display fallback, else `BindNotSupported`.
    pub fn bind(&self, ctx: &BindContext) -> Result<BoundValue> {
        let type_id = ctx.value.type_id();
        if let Some(conv) = self.converters.get(&type_id) {
            return conv(ctx);
        }
        if let Some(fallback) = self.display_fallbacks.get(&type_id) {
            return Ok(BoundValue::Text(fallback(ctx.value)));
        }
        Err(StoreError::BindNotSupported(CompactString::new(
            type_name_hint(ctx.value),
        )))
    }

    /// The process-wide registry, built once with all built-in converters.
    pub fn global() -> &'static ValueRegistry {
        static REGISTRY: OnceLock<ValueRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ValueRegistry::with_builtins)
    }

    /// Builds a registry with every built-in converter.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();

        reg.register::<bool>(|v, _| Ok(BoundValue::Bool(*v)));
        reg.register::<i8>(|v, _| Ok(BoundValue::Int32(*v as i32)));
        reg.register::<u8>(|v, _| Ok(BoundValue::Int32(*v as i32)));
        reg.register::<i16>(|v, _| Ok(BoundValue::Int32(*v as i32)));
        reg.register::<u16>(|v, _| Ok(BoundValue::Int32(*v as i32)));
        reg.register::<i32>(|v, _| Ok(BoundValue::Int32(*v)));
        reg.register::<u32>(|v, _| Ok(BoundValue::Int64(*v as i64)));
        reg.register::<i64>(|v, _| Ok(BoundValue::Int64(*v)));
        // UInt64 reinterprets the bit pattern into i64:
        // SQL-side comparisons on such a column are unsigned-unsafe by design.
        reg.register::<u64>(|v, _| Ok(BoundValue::Int64(*v as i64)));
        reg.register::<f32>(|v, _| Ok(BoundValue::Double(*v as f64)));
        reg.register::<f64>(|v, _| Ok(BoundValue::Double(*v)));
        reg.register::<String>(|v, _| Ok(BoundValue::Text(v.clone())));
        reg.register::<Vec<u8>>(|v, _| Ok(BoundValue::Blob(v.clone())));
        reg.register::<ZeroBlob>(|v, _| Ok(BoundValue::ZeroBlob(v.0)));

        #[cfg(feature = "uuid")]
        reg.register::<uuid::Uuid>(|v, opts| {
            Ok(if opts.guid_as_blob {
                BoundValue::Blob(v.as_bytes().to_vec())
            } else {
                let s = match opts.guid_string_format {
                    GuidStringFormat::Canonical => v.hyphenated().to_string(),
                    GuidStringFormat::Compact => v.simple().to_string(),
                    GuidStringFormat::Braced => v.braced().to_string(),
                };
                BoundValue::Text(s)
            })
        });

        #[cfg(feature = "rust-decimal")]
        reg.register::<rust_decimal::Decimal>(|v, opts| {
            Ok(if opts.decimal_as_blob {
                BoundValue::Blob(v.serialize().to_vec())
            } else {
                BoundValue::Text(v.to_string())
            })
        });

        reg.register::<std::time::Duration>(|v, opts| {
            Ok(if opts.timespan_as_ticks {
                let ticks = (v.as_nanos() / 100) as i64;
                BoundValue::Int64(ticks)
            } else {
                BoundValue::Text(format_duration(*v))
            })
        });

        #[cfg(feature = "chrono")]
        reg.register::<chrono::NaiveDateTime>(|v, opts| {
            Ok(crate::value::datetime::bind_naive(*v, opts.datetime_format))
        });
        #[cfg(feature = "chrono")]
        reg.register::<chrono::DateTime<chrono::Utc>>(|v, opts| {
            Ok(crate::value::datetime::bind_naive(
                v.naive_utc(),
                opts.datetime_format,
            ))
        });
        #[cfg(feature = "chrono")]
        reg.register::<chrono::DateTime<chrono::FixedOffset>>(|v, opts| {
            // DateTimeOffset binds its wall-clock component.
            Ok(crate::value::datetime::bind_naive(
                v.naive_local(),
                opts.datetime_format,
            ))
        });

        reg.register_display_fallback::<CompactString>();

        reg
    }
}

/// Marker newtype requesting a zero-filled BLOB of the given size be bound
/// in place of a caller-supplied buffer.
#[derive(Debug, Clone, Copy)]
pub struct ZeroBlob(pub usize);

/// Binds one host field through the global [`ValueRegistry`].
/// This is how a [`crate::model::Model`] implementation is expected to bind
/// a non-nullable field, rather than constructing a [`BoundValue`] by hand.
pub fn bind<T: 'static>(value: &T, param_index: usize, options: &ConnectionOptions) -> Result<BoundValue> {
    ValueRegistry::global().bind(&BindContext {
        value,
        param_index,
        options,
    })
}

/// Binds an `Option<T>` field: `None` becomes SQL NULL directly, without a
/// registry lookup, since the registry is keyed on `T`'s own `TypeId`, not
/// `Option<T>`'s.
pub fn bind_option<T: 'static>(value: &Option<T>, param_index: usize, options: &ConnectionOptions) -> Result<BoundValue> {
    match value {
        Some(v) => bind(v, param_index, options),
        None => Ok(BoundValue::Null),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let total_ms = d.as_millis();
    let (days, rem) = (total_ms / 86_400_000, total_ms % 86_400_000);
    let (hours, rem) = (rem / 3_600_000, rem % 3_600_000);
    let (mins, rem) = (rem / 60_000, rem % 60_000);
    let (secs, ms) = (rem / 1000, rem % 1000);
    format!("{days}.{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

fn type_name_hint(value: &dyn Any) -> &'static str {
    // `dyn Any` doesn't carry a type name at runtime; callers that need a
    // precise diagnostic should register a converter for the type instead.
    let _ = value;
    "<unregistered host type>"
}

#[cfg(feature = "chrono")]
pub(crate) mod datetime {
    use super::BoundValue;
    use crate::config::DateTimeFormat;
    use chrono::{NaiveDateTime, Timelike};

    const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
    /// 0001-01-01 -> 1970-01-01 in .NET ticks.
    const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;
    /// 1601-01-01 -> 1970-01-01 in 100ns FILETIME units.
    const FILETIME_AT_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

    pub fn bind_naive(dt: NaiveDateTime, format: DateTimeFormat) -> BoundValue {
        match format {
            DateTimeFormat::Iso8601SpaceMs => BoundValue::Text(
                dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            ),
            DateTimeFormat::Iso8601T => {
                BoundValue::Text(dt.format("%Y-%m-%dT%H:%M:%S%.7f").to_string())
            }
            DateTimeFormat::Rfc1123 => {
                BoundValue::Text(dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
            }
            DateTimeFormat::RoundTrip => {
                BoundValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.7f+00:00").to_string())
            }
            DateTimeFormat::Ticks => {
                let unix_ns = dt.and_utc().timestamp_nanos_opt().unwrap_or(0);
                BoundValue::Int64(TICKS_AT_UNIX_EPOCH + unix_ns / 100)
            }
            DateTimeFormat::FileTime | DateTimeFormat::FileTimeUtc => {
                let unix_ns = dt.and_utc().timestamp_nanos_opt().unwrap_or(0);
                BoundValue::Int64(FILETIME_AT_UNIX_EPOCH + unix_ns / 100)
            }
            DateTimeFormat::OleAutomation => {
                let days_since_epoch =
                    (dt.and_utc().timestamp() as f64 + dt.nanosecond() as f64 / 1e9) / 86_400.0;
                BoundValue::Double(days_since_epoch + 25569.0)
            }
            DateTimeFormat::JulianDay => {
                let unix_days =
                    dt.and_utc().timestamp() as f64 / 86_400.0 + dt.nanosecond() as f64 / 1e9 / 86_400.0;
                BoundValue::Double(unix_days + UNIX_EPOCH_JULIAN_DAY)
            }
            DateTimeFormat::UnixSeconds => BoundValue::Int64(dt.and_utc().timestamp()),
            DateTimeFormat::UnixMillis => BoundValue::Int64(dt.and_utc().timestamp_millis()),
        }
    }

    pub fn extract_naive(value: i64, real: Option<f64>, text: Option<&str>, format: DateTimeFormat) -> Option<NaiveDateTime> {
        use chrono::DateTime;
        match format {
            DateTimeFormat::Iso8601SpaceMs => {
                NaiveDateTime::parse_from_str(text?, "%Y-%m-%d %H:%M:%S%.f").ok()
            }
            DateTimeFormat::Iso8601T => {
                NaiveDateTime::parse_from_str(text?, "%Y-%m-%dT%H:%M:%S%.f").ok()
            }
            DateTimeFormat::Rfc1123 => {
                NaiveDateTime::parse_from_str(text?, "%a, %d %b %Y %H:%M:%S GMT").ok()
            }
            DateTimeFormat::RoundTrip => {
                NaiveDateTime::parse_from_str(text?, "%Y-%m-%d %H:%M:%S%.f%:z").ok()
            }
            DateTimeFormat::Ticks => {
                let unix_ns = (value - TICKS_AT_UNIX_EPOCH) * 100;
                DateTime::from_timestamp(unix_ns / 1_000_000_000, (unix_ns % 1_000_000_000) as u32)
                    .map(|d| d.naive_utc())
            }
            DateTimeFormat::FileTime | DateTimeFormat::FileTimeUtc => {
                let unix_ns = (value - FILETIME_AT_UNIX_EPOCH) * 100;
                DateTime::from_timestamp(unix_ns / 1_000_000_000, (unix_ns % 1_000_000_000) as u32)
                    .map(|d| d.naive_utc())
            }
            DateTimeFormat::OleAutomation => {
                let days = real? - 25569.0;
                let secs = (days * 86_400.0).round() as i64;
                DateTime::from_timestamp(secs, 0).map(|d| d.naive_utc())
            }
            DateTimeFormat::JulianDay => {
                let unix_days = real? - UNIX_EPOCH_JULIAN_DAY;
                let secs = (unix_days * 86_400.0).round() as i64;
                DateTime::from_timestamp(secs, 0).map(|d| d.naive_utc())
            }
            DateTimeFormat::UnixSeconds => DateTime::from_timestamp(value, 0).map(|d| d.naive_utc()),
            DateTimeFormat::UnixMillis => {
                DateTime::from_timestamp(value / 1000, ((value % 1000) * 1_000_000) as u32)
                    .map(|d| d.naive_utc())
            }
        }
    }
}

/// Reverses [`ValueRegistry::bind`]: converts an extracted [`SqlValue`] back
/// into a host type, driven by the *target* type.
///
/// There is no single dynamic extractor returning two different host types
/// for one INTEGER column; instead the `i64`/`i32` impls each narrow
/// independently. Callers pick the target type they want (`i32` vs `i64`)
/// and get automatic narrowing-if-it-fits behavior on the `i32` impl,
/// erroring on overflow rather than silently truncating.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self>;
}

fn type_mismatch(found: &SqlValue, target: &'static str) -> StoreError {
    StoreError::Column {
        column: CompactString::new(target),
        message: CompactString::new(format!("cannot convert {found:?} into {target}")),
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Integer(i) => Ok(i != 0),
            other => Err(type_mismatch(&other, "bool")),
        }
    }
}

macro_rules! impl_from_sql_int {
    ($($ty:ty),+) => {
        $(impl FromSqlValue for $ty {
            fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
                match value {
                    // Narrows automatically when the i64 fits the target width.
                    SqlValue::Integer(i) => <$ty>::try_from(i)
                        .map_err(|_| type_mismatch(&SqlValue::Integer(i), stringify!($ty))),
                    other => Err(type_mismatch(&other, stringify!($ty))),
                }
            }
        })+
    };
}
impl_from_sql_int!(i8, u8, i16, u16, i32, u32, i64);

impl FromSqlValue for u64 {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            // Reverses the bitwise reinterpretation used when binding.
            SqlValue::Integer(i) => Ok(i as u64),
            other => Err(type_mismatch(&other, "u64")),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Real(r) => Ok(r as f32),
            SqlValue::Integer(i) => Ok(i as f32),
            other => Err(type_mismatch(&other, "f32")),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Real(r) => Ok(r),
            SqlValue::Integer(i) => Ok(i as f64),
            other => Err(type_mismatch(&other, "f64")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Blob(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
            other => Err(type_mismatch(&other, "String")),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue, _: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(type_mismatch(&other, "Vec<u8>")),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other, options).map(Some),
        }
    }
}

#[cfg(feature = "uuid")]
impl FromSqlValue for uuid::Uuid {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Blob(b) if options.guid_as_blob => {
                uuid::Uuid::from_slice(&b).map_err(|e| type_mismatch_msg("Uuid", &e.to_string()))
            }
            SqlValue::Text(s) => {
                s.parse().map_err(|e: uuid::Error| type_mismatch_msg("Uuid", &e.to_string()))
            }
            other => Err(type_mismatch(&other, "Uuid")),
        }
    }
}

#[cfg(feature = "rust-decimal")]
impl FromSqlValue for rust_decimal::Decimal {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Blob(b) if options.decimal_as_blob && b.len() == 16 => {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(&b);
                Ok(rust_decimal::Decimal::deserialize(buf))
            }
            SqlValue::Text(s) => s
                .parse()
                .map_err(|e: rust_decimal::Error| type_mismatch_msg("Decimal", &e.to_string())),
            other => Err(type_mismatch(&other, "Decimal")),
        }
    }
}

impl FromSqlValue for std::time::Duration {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        match value {
            SqlValue::Integer(ticks) if options.timespan_as_ticks => {
                Ok(std::time::Duration::from_nanos((ticks as u64).saturating_mul(100)))
            }
            SqlValue::Text(s) => parse_duration(&s)
                .ok_or_else(|| type_mismatch_msg("Duration", &s)),
            other => Err(type_mismatch(&other, "Duration")),
        }
    }
}

fn type_mismatch_msg(target: &'static str, msg: &str) -> StoreError {
    StoreError::Column {
        column: CompactString::new(target),
        message: CompactString::new(format!("cannot convert into {target}: {msg}")),
    }
}

fn parse_duration(s: &str) -> Option<std::time::Duration> {
    // Reverses `format_duration`: "d.hh:mm:ss.fff"
    let (days, rest) = s.split_once('.')?;
    let mut parts = rest.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let mins: u64 = parts.next()?.parse().ok()?;
    let sec_part = parts.next()?;
    let (secs, ms) = sec_part.split_once('.').unwrap_or((sec_part, "0"));
    let days: u64 = days.parse().ok()?;
    let secs: u64 = secs.parse().ok()?;
    let ms: u64 = ms.parse().ok()?;
    let total_ms = ((days * 24 + hours) * 60 + mins) * 60_000 + secs * 1000 + ms;
    Some(std::time::Duration::from_millis(total_ms))
}

#[cfg(feature = "chrono")]
impl FromSqlValue for chrono::NaiveDateTime {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        let (i, r, t) = match &value {
            SqlValue::Integer(i) => (*i, None, None),
            SqlValue::Real(r) => (0, Some(*r), None),
            SqlValue::Text(s) => (0, None, Some(s.as_str())),
            SqlValue::Null => return Err(type_mismatch(&value, "NaiveDateTime")),
        };
        datetime::extract_naive(i, r, t, options.datetime_format)
            .ok_or_else(|| type_mismatch(&value, "NaiveDateTime"))
    }
}

#[cfg(feature = "chrono")]
impl FromSqlValue for chrono::DateTime<chrono::Utc> {
    fn from_sql_value(value: SqlValue, options: &ConnectionOptions) -> Result<Self> {
        chrono::NaiveDateTime::from_sql_value(value, options).map(|naive| naive.and_utc())
    }
}
