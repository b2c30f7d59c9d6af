//! Connection-wide configuration affecting value conversion and ambient
//! PRAGMA behavior.

use std::time::Duration;

/// How a bound/extracted `DateTime` is represented on the wire.
///
/// `Iso8601SpaceMs` is the default, matching the historical default format
/// of the systems this layout is interoperable with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateTimeFormat {
    /// `yyyy-MM-dd HH:mm:ss.fff`
    #[default]
    Iso8601SpaceMs,
    /// `yyyy-MM-ddTHH:mm:ss.fffffff`
    Iso8601T,
    /// RFC 1123 (`Tue, 15 Nov 1994 08:12:31 GMT`)
    Rfc1123,
    /// `yyyy-MM-dd HH:mm:ss.fffffffzzz` — round-trips through local offset.
    RoundTrip,
    /// .NET-style 100ns ticks since `0001-01-01`, stored as INTEGER.
    Ticks,
    /// Windows FILETIME, local time, stored as INTEGER.
    FileTime,
    /// Windows FILETIME, UTC, stored as INTEGER.
    FileTimeUtc,
    /// OLE Automation date (days since 1899-12-30), stored as REAL.
    OleAutomation,
    /// Julian day number, stored as REAL.
    JulianDay,
    /// Unix seconds, stored as INTEGER.
    UnixSeconds,
    /// Unix milliseconds, stored as INTEGER.
    UnixMillis,
}

/// Guid (UUID) wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuidStringFormat {
    /// Canonical `8-4-4-4-12` hyphenated form.
    #[default]
    Canonical,
    /// `N` form: no hyphens.
    Compact,
    /// `B` form: wrapped in braces.
    Braced,
}

/// Per-connection configuration governing the value-conversion pipeline and
/// a handful of ambient PRAGMAs applied once at [`crate::connection::Connection::open`].
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Bind GUIDs as a 16-byte little-endian BLOB instead of a string.
    pub guid_as_blob: bool,
    /// String representation used when `guid_as_blob` is false.
    pub guid_string_format: GuidStringFormat,
    /// Bind decimals as their 16-byte on-wire representation instead of text.
    pub decimal_as_blob: bool,
    /// Bind `TimeSpan`-like durations as i64 ticks instead of a duration string.
    pub timespan_as_ticks: bool,
    /// Wire format for `DateTime`/`DateTimeOffset` values.
    pub datetime_format: DateTimeFormat,
    /// Case-insensitive string equality via `COLLATE NOCASE` in translated
    /// predicates.
    pub case_insensitive_text: bool,
    /// `PRAGMA busy_timeout`, applied once at open. Default 30s.
    pub busy_timeout: Duration,
    /// `PRAGMA journal_mode`. Defaults to WAL, the recommended mode.
    pub journal_mode: JournalMode,
    /// `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            guid_as_blob: false,
            guid_string_format: GuidStringFormat::default(),
            decimal_as_blob: false,
            timespan_as_ticks: false,
            datetime_format: DateTimeFormat::default(),
            case_insensitive_text: false,
            busy_timeout: Duration::from_secs(30),
            journal_mode: JournalMode::Wal,
            foreign_keys: true,
        }
    }
}

impl ConnectionOptions {
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::default()
    }
}

/// `PRAGMA journal_mode` values relevant to a single-file embedded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_pragma_value(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Fluent builder over a typed PRAGMA surface rather than a raw-SQL config
/// string.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptionsBuilder {
    opts: OptionalOverrides,
}

#[derive(Debug, Clone, Default)]
struct OptionalOverrides {
    guid_as_blob: Option<bool>,
    guid_string_format: Option<GuidStringFormat>,
    decimal_as_blob: Option<bool>,
    timespan_as_ticks: Option<bool>,
    datetime_format: Option<DateTimeFormat>,
    case_insensitive_text: Option<bool>,
    busy_timeout: Option<Duration>,
    journal_mode: Option<JournalMode>,
    foreign_keys: Option<bool>,
}

macro_rules! builder_field {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.opts.$name = Some(value);
            self
        }
    };
}

impl ConnectionOptionsBuilder {
    builder_field!(guid_as_blob, bool);
    builder_field!(guid_string_format, GuidStringFormat);
    builder_field!(decimal_as_blob, bool);
    builder_field!(timespan_as_ticks, bool);
    builder_field!(datetime_format, DateTimeFormat);
    builder_field!(case_insensitive_text, bool);
    builder_field!(busy_timeout, Duration);
    builder_field!(journal_mode, JournalMode);
    builder_field!(foreign_keys, bool);

    pub fn build(self) -> ConnectionOptions {
        let default = ConnectionOptions::default();
        ConnectionOptions {
            guid_as_blob: self.opts.guid_as_blob.unwrap_or(default.guid_as_blob),
            guid_string_format: self
                .opts
                .guid_string_format
                .unwrap_or(default.guid_string_format),
            decimal_as_blob: self.opts.decimal_as_blob.unwrap_or(default.decimal_as_blob),
            timespan_as_ticks: self
                .opts
                .timespan_as_ticks
                .unwrap_or(default.timespan_as_ticks),
            datetime_format: self.opts.datetime_format.unwrap_or(default.datetime_format),
            case_insensitive_text: self
                .opts
                .case_insensitive_text
                .unwrap_or(default.case_insensitive_text),
            busy_timeout: self.opts.busy_timeout.unwrap_or(default.busy_timeout),
            journal_mode: self.opts.journal_mode.unwrap_or(default.journal_mode),
            foreign_keys: self.opts.foreign_keys.unwrap_or(default.foreign_keys),
        }
    }
}
