//! Schema synchronization: reconciles a [`TableDescriptor`]
//! against the live schema by diffing `PRAGMA table_info`, emitting only
//! additive DDL (`CREATE TABLE` / `ALTER TABLE ... ADD COLUMN`) and never
//! dropping or retyping a column.

use crate::connection::Connection;
use crate::error::Result;
use crate::ident::escape_identifier;
use crate::statement::StepResult;
use crate::store_trace_schema_incompatible;
use crate::table::{ColumnDescriptor, TableDescriptor};
use crate::value::{BoundValue, SqlValue};

struct LiveColumn {
    name: String,
    declared_type: String,
}

/// Synchronizes `descriptor`'s table against the live schema, creating it if
/// absent and adding any columns present in `descriptor` but missing live
///. Idempotent: calling this twice in a row with the same
/// descriptor issues no DDL the second time.
pub fn synchronize(conn: &Connection, descriptor: &TableDescriptor) -> Result<()> {
    if !table_exists(conn, &descriptor.name)? {
        conn.execute_nonquery(&create_table_sql(descriptor), &[])?;
        return Ok(());
    }

    let live = read_live_columns(conn, &descriptor.name)?;
    for column in &descriptor.columns {
        match live.iter().find(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            None => add_column(conn, descriptor, column)?,
            Some(existing) => warn_if_affinity_mismatch(&descriptor.name, column, existing),
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt = conn.query(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        &[BoundValue::Text(table.to_string())],
    )?;
    Ok(stmt.step()? == StepResult::Row)
}

fn read_live_columns(conn: &Connection, table: &str) -> Result<Vec<LiveColumn>> {
    // `PRAGMA table_info(x)` does not accept a bound parameter for the table
    // name; the identifier is escaped and interpolated instead, matching
    // SQLite's own pragma surface.
    let sql = format!("PRAGMA table_info({})", escape_identifier(table));
    let mut stmt = conn.query(&sql, &[])?;
    let name_idx = stmt.column_index_of("name")?;
    let type_idx = stmt.column_index_of("type")?;

    let mut out = Vec::new();
    while stmt.step()? == StepResult::Row {
        let name = match stmt.column_value(name_idx)? {
            SqlValue::Text(s) => s,
            _ => continue,
        };
        let declared_type = match stmt.column_value(type_idx)? {
            SqlValue::Text(s) => s,
            _ => String::new(),
        };
        out.push(LiveColumn { name, declared_type });
    }
    Ok(out)
}

fn create_table_sql(descriptor: &TableDescriptor) -> String {
    let mut defs: Vec<String> = descriptor.columns.iter().map(column_definition).collect();

    let pk = descriptor.primary_key_columns();
    if let Some(idx) = descriptor.columns.iter().position(|c| c.auto_increment) {
        // A single integer auto-increment PK is declared inline so SQLite
        // treats it as an alias for `rowid`.
        defs[idx] = format!(
            "{} {} PRIMARY KEY AUTOINCREMENT",
            descriptor.columns[idx].escaped_name(),
            descriptor.columns[idx].affinity.as_sql()
        );
    } else if !pk.is_empty() {
        let names: Vec<String> = pk.iter().map(|c| c.escaped_name()).collect();
        defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    format!("CREATE TABLE {} ({})", descriptor.escaped_name(), defs.join(", "))
}

fn column_definition(column: &ColumnDescriptor) -> String {
    let mut def = format!("{} {}", column.escaped_name(), column.affinity.as_sql());
    if !column.nullable && !column.is_primary_key() {
        def.push_str(" NOT NULL");
    }
    if let Some(literal) = &column.default_literal {
        def.push_str(" DEFAULT ");
        def.push_str(literal);
    }
    if let Some(collation) = &column.collation {
        def.push_str(" COLLATE ");
        def.push_str(collation);
    }
    def
}

fn add_column(conn: &Connection, table: &TableDescriptor, column: &ColumnDescriptor) -> Result<()> {
    if !column.nullable && column.default_literal.is_none() {
        // SQLite refuses `ADD COLUMN ... NOT NULL` without a default unless
        // every existing row would otherwise be left invalid; rather than
        // guess a default, this is reported and the column is skipped
        //.
        store_trace_schema_incompatible!(table.name, column.name);
        return Ok(());
    }
    let sql = format!("ALTER TABLE {} ADD COLUMN {}", table.escaped_name(), column_definition(column));
    conn.execute_nonquery(&sql, &[])?;
    Ok(())
}

fn warn_if_affinity_mismatch(table: &str, descriptor: &ColumnDescriptor, live: &LiveColumn) {
    if !sqlite_affinity_matches(descriptor.affinity, &live.declared_type) {
        store_trace_schema_incompatible!(table, live.name);
    }
}

/// SQLite's own type-affinity rules (substring matches against the declared
/// type name), used only to flag a pre-existing mismatch — this crate never
/// retypes a live column.
fn sqlite_affinity_matches(affinity: crate::table::Affinity, declared_type: &str) -> bool {
    use crate::table::Affinity;
    let upper = declared_type.to_ascii_uppercase();
    match affinity {
        Affinity::Integer => upper.contains("INT"),
        Affinity::Text => upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT"),
        Affinity::Blob => upper.is_empty() || upper.contains("BLOB"),
        Affinity::Real => upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::table::{Affinity, ColumnAttributes, TableDescriptorBuilder};

    fn user_descriptor() -> TableDescriptor {
        TableDescriptorBuilder::new("User")
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
            .add_column("name", Affinity::Text, ColumnAttributes::default(), 1)
            .finalize()
            .unwrap()
    }

    #[test]
    fn creates_table_when_absent() {
        let conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        let descriptor = user_descriptor();
        synchronize(&conn, &descriptor).unwrap();
        assert!(table_exists(&conn, "User").unwrap());
    }

    #[test]
    fn is_idempotent_on_an_already_synced_table() {
        let conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        let descriptor = user_descriptor();
        synchronize(&conn, &descriptor).unwrap();
        synchronize(&conn, &descriptor).unwrap();
    }

    #[test]
    fn adding_a_field_preserves_existing_rows_with_null() {
        let conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        synchronize(&conn, &user_descriptor()).unwrap();
        conn.execute_nonquery("INSERT INTO \"User\" (name) VALUES ('ada')", &[]).unwrap();

        let widened = TableDescriptorBuilder::new("User")
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
            .add_column("name", Affinity::Text, ColumnAttributes::default(), 1)
            .add_column(
                "email",
                Affinity::Text,
                ColumnAttributes {
                    nullable: Some(true),
                    ..Default::default()
                },
                2,
            )
            .finalize()
            .unwrap();
        synchronize(&conn, &widened).unwrap();

        let mut stmt = conn.query("SELECT email FROM \"User\" WHERE name = 'ada'", &[]).unwrap();
        stmt.step().unwrap();
        assert_eq!(stmt.column_value(0).unwrap(), SqlValue::Null);
    }
}
