use litebase::prelude::*;
use litebase::schema;
use litebase::value::{self, SqlValue};

struct Account {
    id: String,
    balance: i64,
}

impl Model for Account {
    fn build_descriptor() -> TableDescriptor {
        TableDescriptorBuilder::new("Account")
            .add_typed_column::<String>(
                "id",
                ColumnAttributes {
                    primary_key: true,
                    ..Default::default()
                },
                0,
            )
            .add_typed_column::<i64>("balance", ColumnAttributes::default(), 1)
            .finalize()
            .unwrap()
    }

    fn bind_field(&self, field_index: usize, options: &ConnectionOptions) -> Result<BoundValue> {
        match field_index {
            0 => value::bind(&self.id, field_index, options),
            1 => value::bind(&self.balance, field_index, options),
            _ => unreachable!(),
        }
    }

    fn set_field(&mut self, field_index: usize, value: SqlValue, options: &ConnectionOptions) -> Result<()> {
        match field_index {
            0 => self.id = FromSqlValue::from_sql_value(value, options)?,
            1 => self.balance = FromSqlValue::from_sql_value(value, options)?,
            _ => {}
        }
        Ok(())
    }

    fn default_instance() -> Self {
        Account {
            id: String::new(),
            balance: 0,
        }
    }

    fn set_auto_increment_pk(&mut self, _rowid: i64) {
        unreachable!("Account has no auto-increment primary key")
    }
}

struct Event {
    id: i64,
    payload: String,
}

impl Model for Event {
    fn build_descriptor() -> TableDescriptor {
        TableDescriptorBuilder::new("Event")
            .add_typed_column::<i64>(
                "id",
                ColumnAttributes {
                    primary_key: true,
                    auto_increment: true,
                    ..Default::default()
                },
                0,
            )
            .add_typed_column::<String>("payload", ColumnAttributes::default(), 1)
            .finalize()
            .unwrap()
    }

    fn bind_field(&self, field_index: usize, options: &ConnectionOptions) -> Result<BoundValue> {
        match field_index {
            0 => value::bind(&self.id, field_index, options),
            1 => value::bind(&self.payload, field_index, options),
            _ => unreachable!(),
        }
    }

    fn set_field(&mut self, field_index: usize, value: SqlValue, options: &ConnectionOptions) -> Result<()> {
        match field_index {
            0 => self.id = FromSqlValue::from_sql_value(value, options)?,
            1 => self.payload = FromSqlValue::from_sql_value(value, options)?,
            _ => {}
        }
        Ok(())
    }

    fn default_instance() -> Self {
        Event {
            id: 0,
            payload: String::new(),
        }
    }

    fn set_auto_increment_pk(&mut self, rowid: i64) {
        self.id = rowid;
    }
}

fn opened_connection() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("store.sqlite3");
    let conn = Connection::open(&path, ConnectionOptions::default()).expect("open connection");
    (dir, conn)
}

#[test]
fn save_and_load_round_trip_by_string_primary_key() {
    let (_dir, conn) = opened_connection();
    schema::synchronize(&conn, &TypeRegistry::global().describe::<Account>()).unwrap();

    let mut account = Account {
        id: "acct-1".into(),
        balance: 500,
    };
    save(&conn, &mut account).unwrap();

    let loaded: Account = load(&conn, &[BoundValue::Text("acct-1".into())]).unwrap().unwrap();
    assert_eq!(loaded.balance, 500);
}

#[test]
fn saving_the_same_primary_key_twice_updates_in_place() {
    let (_dir, conn) = opened_connection();
    schema::synchronize(&conn, &TypeRegistry::global().describe::<Account>()).unwrap();

    let mut account = Account {
        id: "acct-1".into(),
        balance: 500,
    };
    save(&conn, &mut account).unwrap();

    account.balance = 750;
    save(&conn, &mut account).unwrap();

    let all: Vec<Account> = load_all(&conn).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].balance, 750);
}

#[test]
fn auto_increment_primary_key_advances_across_many_inserts() {
    let (_dir, conn) = opened_connection();
    schema::synchronize(&conn, &TypeRegistry::global().describe::<Event>()).unwrap();

    for i in 0..100 {
        let mut event = Event {
            id: 0,
            payload: format!("event-{i}"),
        };
        save(&conn, &mut event).unwrap();
    }

    assert_eq!(conn.last_insert_rowid(), 100);
    let all: Vec<Event> = load_all(&conn).unwrap();
    assert_eq!(all.len(), 100);
}

#[test]
fn predicate_translates_to_parameterized_sql() {
    let expr = Expr::Logical(
        LogicalOp::And,
        Box::new(Expr::Binary(
            BinaryOp::GreaterThan,
            Box::new(Expr::Field("Age".into())),
            Box::new(Expr::Constant(SqlValue::Integer(21))),
        )),
        Box::new(Expr::Call(MethodCall::StartsWith(
            Box::new(Expr::Field("Name".into())),
            Box::new(Expr::Constant(SqlValue::Text("A".into()))),
        ))),
    );

    let (sql, params) = translate(&expr, &ConnectionOptions::default()).unwrap();
    assert_eq!(sql, "((\"Age\" > ?) AND (\"Name\" LIKE ? ESCAPE '\\'))");
    assert_eq!(params, vec![BoundValue::Int64(21), BoundValue::Text("A%".into())]);
}

#[test]
fn adding_a_field_and_resyncing_preserves_old_rows_with_null() {
    let (_dir, conn) = opened_connection();
    schema::synchronize(&conn, &TypeRegistry::global().describe::<Account>()).unwrap();

    let mut account = Account {
        id: "acct-1".into(),
        balance: 500,
    };
    save(&conn, &mut account).unwrap();

    let widened = TableDescriptorBuilder::new("Account")
        .add_column(
            "id",
            Affinity::Text,
            ColumnAttributes {
                primary_key: true,
                ..Default::default()
            },
            0,
        )
        .add_column("balance", Affinity::Integer, ColumnAttributes::default(), 1)
        .add_column(
            "nickname",
            Affinity::Text,
            ColumnAttributes {
                nullable: Some(true),
                ..Default::default()
            },
            2,
        )
        .finalize()
        .unwrap();
    schema::synchronize(&conn, &widened).unwrap();

    let mut stmt = conn.query("SELECT nickname FROM \"Account\" WHERE id = 'acct-1'", &[]).unwrap();
    stmt.step().unwrap();
    assert_eq!(stmt.column_value(0).unwrap(), SqlValue::Null);

    let all: Vec<Account> = load_all(&conn).unwrap();
    assert_eq!(all.len(), 1, "the pre-existing row must survive the schema widening");
}

#[test]
fn a_failed_transaction_persists_nothing() {
    let (_dir, mut conn) = opened_connection();
    schema::synchronize(&conn, &TypeRegistry::global().describe::<Event>()).unwrap();

    let outcome: Result<()> = conn.with_transaction(|tx| {
        let mut event = Event {
            id: 0,
            payload: "will not survive".into(),
        };
        save(tx, &mut event)?;
        tx.execute_nonquery("INSERT INTO no_such_table VALUES (1)", &[])?;
        Ok(())
    });

    assert!(outcome.is_err());
    let all: Vec<Event> = load_all(&conn).unwrap();
    assert!(all.is_empty());
}
