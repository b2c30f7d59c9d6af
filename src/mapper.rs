//! Object mapper: `Save`/`Load`/`LoadAll`/`Delete` built on top
//! of [`crate::connection::Connection`], [`crate::statement::Statement`],
//! and the per-type descriptor from [`crate::model::TypeRegistry`].

use crate::connection::Connection;
use crate::error::{Result, StoreError};
use crate::model::{Model, TypeRegistry};
use crate::statement::{StepResult, Statement};
use crate::table::{ColumnDescriptor, TableDescriptor};
use crate::value::BoundValue;
use crate::ConnectionOptions;

/// Inserts or updates `value`:
/// - if the table has an auto-increment primary key and it is still at its
///   zero default, a plain `INSERT` is issued and the assigned rowid is
///   written back into `value` via [`Model::set_auto_increment_pk`];
/// - otherwise an `INSERT ... ON CONFLICT(pk) DO UPDATE` is issued, so
///   saving a record whose primary key already exists updates the existing
///   row in place.
pub fn save<T: Model>(conn: &Connection, value: &mut T) -> Result<()> {
    let descriptor = TypeRegistry::global().describe::<T>();

    let is_new_auto_increment = match descriptor.auto_increment_column() {
        Some(col) => is_zero(&value.bind_field(col.field_index, conn.options())?),
        None => false,
    };

    if let (true, Some(auto_col)) = (is_new_auto_increment, descriptor.auto_increment_column()) {
        insert_new(conn, &descriptor, value, auto_col)?;
        value.set_auto_increment_pk(conn.last_insert_rowid());
    } else {
        upsert(conn, &descriptor, value)?;
    }
    Ok(())
}

/// Loads the single row with the given primary-key values, or `None` if no
/// such row exists. `pk_values` must be supplied in the
/// table's declared primary-key order.
pub fn load<T: Model>(conn: &Connection, pk_values: &[BoundValue]) -> Result<Option<T>> {
    let descriptor = TypeRegistry::global().describe::<T>();
    let sql = format!(
        "SELECT * FROM {} WHERE {}",
        descriptor.escaped_name(),
        pk_where_clause(&descriptor)
    );
    let mut stmt = conn.query(&sql, pk_values)?;
    if stmt.step()? == StepResult::Row {
        Ok(Some(materialize::<T>(&descriptor, &mut stmt, conn.options())?))
    } else {
        Ok(None)
    }
}

/// Loads every row of the table.
pub fn load_all<T: Model>(conn: &Connection) -> Result<Vec<T>> {
    let descriptor = TypeRegistry::global().describe::<T>();
    let sql = format!("SELECT * FROM {}", descriptor.escaped_name());
    let mut stmt = conn.query(&sql, &[])?;
    let mut out = Vec::new();
    while stmt.step()? == StepResult::Row {
        out.push(materialize::<T>(&descriptor, &mut stmt, conn.options())?);
    }
    Ok(out)
}

/// Deletes the row with the given primary-key values. Returns whether a row
/// was actually removed.
pub fn delete<T: Model>(conn: &Connection, pk_values: &[BoundValue]) -> Result<bool> {
    let descriptor = TypeRegistry::global().describe::<T>();
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        descriptor.escaped_name(),
        pk_where_clause(&descriptor)
    );
    Ok(conn.execute_nonquery(&sql, pk_values)? > 0)
}

fn pk_where_clause(descriptor: &TableDescriptor) -> String {
    descriptor
        .primary_key_columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.escaped_name(), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn is_zero(value: &BoundValue) -> bool {
    matches!(value, BoundValue::Int32(0) | BoundValue::Int64(0))
}

fn insert_new<T: Model>(
    conn: &Connection,
    descriptor: &TableDescriptor,
    value: &T,
    auto_increment: &ColumnDescriptor,
) -> Result<()> {
    let columns: Vec<&ColumnDescriptor> = descriptor
        .columns
        .iter()
        .filter(|c| c.field_index != auto_increment.field_index)
        .collect();

    let mut params = Vec::with_capacity(columns.len());
    for column in &columns {
        params.push(value.bind_field(column.field_index, conn.options())?);
    }

    let column_list = columns.iter().map(|c| c.escaped_name()).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        descriptor.escaped_name()
    );

    conn.execute_nonquery(&sql, &params)?;
    Ok(())
}

fn upsert<T: Model>(conn: &Connection, descriptor: &TableDescriptor, value: &T) -> Result<()> {
    let mut params = Vec::with_capacity(descriptor.columns.len());
    for column in &descriptor.columns {
        params.push(value.bind_field(column.field_index, conn.options())?);
    }

    let column_list = descriptor
        .columns
        .iter()
        .map(|c| c.escaped_name())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=descriptor.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let conflict_cols = descriptor
        .primary_key_columns()
        .iter()
        .map(|c| c.escaped_name())
        .collect::<Vec<_>>()
        .join(", ");
    let non_pk: Vec<&ColumnDescriptor> = descriptor.columns.iter().filter(|c| !c.is_primary_key()).collect();

    let sql = if non_pk.is_empty() {
        format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders}) ON CONFLICT ({conflict_cols}) DO NOTHING",
            descriptor.escaped_name()
        )
    } else {
        let assignments = non_pk
            .iter()
            .map(|c| format!("{} = excluded.{}", c.escaped_name(), c.escaped_name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders}) ON CONFLICT ({conflict_cols}) DO UPDATE SET {assignments}",
            descriptor.escaped_name()
        )
    };

    conn.execute_nonquery(&sql, &params)?;
    Ok(())
}

fn materialize<T: Model>(descriptor: &TableDescriptor, stmt: &mut Statement<'_>, options: &ConnectionOptions) -> Result<T> {
    let mut instance = T::default_instance();
    for column in &descriptor.columns {
        let idx = match stmt.column_index_of(&column.name) {
            Ok(idx) => idx,
            Err(StoreError::UnknownColumn(_)) => continue,
            Err(e) => return Err(e),
        };
        let raw = stmt.column_value(idx)?;
        instance.set_field(column.field_index, raw, options)?;
    }
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::schema;
    use crate::table::{ColumnAttributes, TableDescriptorBuilder};
    use crate::value::SqlValue;

    struct User {
        id: i64,
        name: String,
    }

    impl Model for User {
        fn build_descriptor() -> TableDescriptor {
            TableDescriptorBuilder::new("User")
                .add_typed_column::<i64>(
                    "id",
                    ColumnAttributes {
                        primary_key: true,
                        auto_increment: true,
                        ..Default::default()
                    },
                    0,
                )
                .add_typed_column::<String>("name", ColumnAttributes::default(), 1)
                .finalize()
                .unwrap()
        }

        fn bind_field(&self, field_index: usize, options: &ConnectionOptions) -> Result<BoundValue> {
            match field_index {
                0 => crate::value::bind(&self.id, field_index, options),
                1 => crate::value::bind(&self.name, field_index, options),
                _ => unreachable!(),
            }
        }

        fn set_field(&mut self, field_index: usize, value: SqlValue, options: &ConnectionOptions) -> Result<()> {
            match field_index {
                0 => self.id = crate::value::FromSqlValue::from_sql_value(value, options)?,
                1 => self.name = crate::value::FromSqlValue::from_sql_value(value, options)?,
                _ => {}
            }
            Ok(())
        }

        fn default_instance() -> Self {
            User { id: 0, name: String::new() }
        }

        fn set_auto_increment_pk(&mut self, rowid: i64) {
            self.id = rowid;
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        schema::synchronize(&conn, &TypeRegistry::global().describe::<User>()).unwrap();
        conn
    }

    #[test]
    fn save_assigns_auto_increment_pk_then_loads_back() {
        let conn = setup();
        let mut user = User { id: 0, name: "ada".into() };
        save(&conn, &mut user).unwrap();
        assert_eq!(user.id, 1);

        let loaded: User = load(&conn, &[BoundValue::Int64(1)]).unwrap().unwrap();
        assert_eq!(loaded.name, "ada");
    }

    #[test]
    fn saving_twice_updates_in_place() {
        let conn = setup();
        let mut user = User { id: 0, name: "ada".into() };
        save(&conn, &mut user).unwrap();

        user.name = "grace".into();
        save(&conn, &mut user).unwrap();

        let all: Vec<User> = load_all(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "grace");
    }

    #[test]
    fn delete_removes_matching_row() {
        let conn = setup();
        let mut user = User { id: 0, name: "ada".into() };
        save(&conn, &mut user).unwrap();

        assert!(delete::<User>(&conn, &[BoundValue::Int64(user.id)]).unwrap());
        assert!(load::<User>(&conn, &[BoundValue::Int64(user.id)]).unwrap().is_none());
    }

    #[test]
    fn load_missing_row_returns_none_not_error() {
        let conn = setup();
        let result = load::<User>(&conn, &[BoundValue::Int64(999)]);
        assert!(matches!(result, Ok(None)));
    }
}
