//! Table/column descriptors and the fluent runtime builder used to
//! construct them rather than a derive macro — see DESIGN.md for why.

use compact_str::CompactString;

use crate::ident::{disambiguate_from_type_name, escape_identifier, sanitize_identifier};

/// SQLite's storage affinities, resolved from a host field's declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    Blob,
}

impl Affinity {
    pub fn as_sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
            Affinity::Blob => "BLOB",
        }
    }
}

/// Resolves the SQLite storage affinity for a host field type, so
/// [`TableDescriptorBuilder::add_typed_column`] can infer a column's
/// affinity from the field's Rust type instead of the caller repeating it
/// as a literal.
pub trait HasAffinity {
    const AFFINITY: Affinity;
    /// Whether this type's column should be nullable by default.
    const NULLABLE: bool = false;
}

macro_rules! impl_has_affinity {
    ($affinity:expr; $($ty:ty),+ $(,)?) => {
        $(impl HasAffinity for $ty {
            const AFFINITY: Affinity = $affinity;
        })+
    };
}

impl_has_affinity!(Affinity::Integer; bool, i8, u8, i16, u16, i32, u32, i64, u64);
impl_has_affinity!(Affinity::Real; f32, f64);
impl_has_affinity!(Affinity::Text; String);
impl_has_affinity!(Affinity::Blob; Vec<u8>);

#[cfg(feature = "uuid")]
impl_has_affinity!(Affinity::Text; uuid::Uuid);
#[cfg(feature = "rust-decimal")]
impl_has_affinity!(Affinity::Text; rust_decimal::Decimal);
#[cfg(feature = "chrono")]
impl_has_affinity!(Affinity::Text; chrono::NaiveDateTime, chrono::DateTime<chrono::Utc>);
impl_has_affinity!(Affinity::Text; std::time::Duration);

impl<T: HasAffinity> HasAffinity for Option<T> {
    const AFFINITY: Affinity = T::AFFINITY;
    const NULLABLE: bool = true;
}

/// The reflected, sanitized image of one host field.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// Sanitized, not-yet-escaped column name.
    pub name: CompactString,
    pub affinity: Affinity,
    pub nullable: bool,
    /// Ordinal within a composite primary key; `None` if not part of the PK.
    pub pk_ordinal: Option<u32>,
    pub auto_increment: bool,
    pub default_literal: Option<CompactString>,
    pub collation: Option<CompactString>,
    /// Index of this field within the host record, used by the object
    /// mapper to read/write it without per-type generated code.
    pub field_index: usize,
}

impl ColumnDescriptor {
    pub fn escaped_name(&self) -> String {
        escape_identifier(&self.name)
    }

    pub fn is_primary_key(&self) -> bool {
        self.pk_ordinal.is_some()
    }
}

/// The reflected image of a host record type.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub schema_owner: Option<CompactString>,
    pub name: CompactString,
    pub columns: Vec<ColumnDescriptor>,
    /// Whether this descriptor has been reconciled against the live schema
    ///. Consulted by [`crate::schema`] before issuing DDL.
    pub reconciled: bool,
}

impl TableDescriptor {
    pub fn escaped_name(&self) -> String {
        escape_identifier(&self.name)
    }

    /// Columns making up the primary key, in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&ColumnDescriptor> {
        let mut pk: Vec<&ColumnDescriptor> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk_ordinal.unwrap_or(u32::MAX));
        pk
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Per-field annotation supplied by the caller constructing a descriptor.
#[derive(Debug, Clone, Default)]
pub struct ColumnAttributes {
    pub name_override: Option<String>,
    pub primary_key: bool,
    pub nullable: Option<bool>,
    pub auto_increment: bool,
    pub default_literal: Option<String>,
    pub collation: Option<String>,
    pub ignore: bool,
}

/// Builder used to reflect a host record type once into a [`TableDescriptor`],
/// via a `.add_column(..).finalize()` fluent chain.
pub struct TableDescriptorBuilder {
    type_name: String,
    table_name: String,
    schema_owner: Option<String>,
    columns: Vec<ColumnDescriptor>,
    next_pk_ordinal: u32,
}

impl TableDescriptorBuilder {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            table_name: sanitize_identifier(type_name),
            schema_owner: None,
            columns: Vec::new(),
            next_pk_ordinal: 0,
        }
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn schema(mut self, owner: impl Into<String>) -> Self {
        self.schema_owner = Some(owner.into());
        self
    }

    /// Adds one reflected field in declaration order.
    /// `raw_field_name` is the Rust field identifier before sanitization.
    pub fn add_column(
        mut self,
        raw_field_name: &str,
        affinity: Affinity,
        attrs: ColumnAttributes,
        field_index: usize,
    ) -> Self {
        if attrs.ignore {
            return self;
        }

        let sanitized = attrs
            .name_override
            .clone()
            .unwrap_or_else(|| sanitize_identifier(raw_field_name));
        let name = disambiguate_from_type_name(&sanitized, &self.type_name);

        let pk_ordinal = if attrs.primary_key {
            let ord = self.next_pk_ordinal;
            self.next_pk_ordinal += 1;
            Some(ord)
        } else {
            None
        };

        // Auto-increment is only valid on an integer primary key.
        let auto_increment = attrs.auto_increment && attrs.primary_key && affinity == Affinity::Integer;

        self.columns.push(ColumnDescriptor {
            name: CompactString::new(name),
            affinity,
            nullable: attrs.nullable.unwrap_or(!attrs.primary_key),
            pk_ordinal,
            auto_increment,
            default_literal: attrs.default_literal.map(CompactString::new),
            collation: attrs.collation.map(CompactString::new),
            field_index,
        });
        self
    }

    /// Like [`Self::add_column`], but resolves `affinity` and the default
    /// nullability from `T`'s [`HasAffinity`] impl instead of a caller-supplied
    /// literal.
    pub fn add_typed_column<T: HasAffinity>(self, raw_field_name: &str, mut attrs: ColumnAttributes, field_index: usize) -> Self {
        if attrs.nullable.is_none() {
            attrs.nullable = Some(T::NULLABLE);
        }
        self.add_column(raw_field_name, T::AFFINITY, attrs, field_index)
    }

    pub fn finalize(self) -> Result<TableDescriptor, String> {
        let auto_increment_count = self.columns.iter().filter(|c| c.auto_increment).count();
        if auto_increment_count > 1 {
            return Err("at most one auto-increment column is allowed per table".to_string());
        }

        Ok(TableDescriptor {
            schema_owner: self.schema_owner.map(CompactString::new),
            name: CompactString::new(self.table_name),
            columns: self.columns,
            reconciled: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_auto_increment_integer_pk_ok() {
        let table = TableDescriptorBuilder::new("User")
            .add_column(
                "id",
                Affinity::Integer,
                ColumnAttributes {
                    primary_key: true,
                    auto_increment: true,
                    ..Default::default()
                },
                0,
            )
            .finalize()
            .unwrap();
        assert_eq!(table.auto_increment_column().unwrap().name, "id");
    }

    #[test]
    fn rejects_two_auto_increment_columns() {
        let err = TableDescriptorBuilder::new("Weird")
            .add_column(
                "a",
                Affinity::Integer,
                ColumnAttributes {
                    primary_key: true,
                    auto_increment: true,
                    ..Default::default()
                },
                0,
            )
            .add_column(
                "b",
                Affinity::Integer,
                ColumnAttributes {
                    primary_key: true,
                    auto_increment: true,
                    ..Default::default()
                },
                1,
            )
            .finalize();
        assert!(err.is_err());
    }

    #[test]
    fn composite_primary_key_preserves_declaration_order() {
        let table = TableDescriptorBuilder::new("Membership")
            .add_column(
                "group_id",
                Affinity::Integer,
                ColumnAttributes {
                    primary_key: true,
                    ..Default::default()
                },
                0,
            )
            .add_column(
                "user_id",
                Affinity::Integer,
                ColumnAttributes {
                    primary_key: true,
                    ..Default::default()
                },
                1,
            )
            .finalize()
            .unwrap();
        let pk = table.primary_key_columns();
        assert_eq!(pk[0].name, "groupId");
        assert_eq!(pk[1].name, "userId");
    }
}
