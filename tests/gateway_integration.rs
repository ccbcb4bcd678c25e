//! End-to-end gateway behavior over both backends.

use rowgate::{
    Error, JoinDefinition, JoinKind, Params, QueryGateway, QueryOptions, Schema, SortDirection,
    Value,
};

fn mock_gateway_with_users() -> QueryGateway {
    let mut gateway = QueryGateway::mock();
    gateway
        .register_schema("user", Schema::new("users", "u").with_primary_key("id"))
        .unwrap();
    for name in ["Ann", "Bo"] {
        let mut record = gateway.create("user", [("name", name)]).unwrap();
        gateway.save(&mut record).unwrap();
    }
    gateway
}

fn sqlite_gateway_with_users() -> QueryGateway {
    let mut gateway = QueryGateway::sqlite_in_memory().unwrap();
    gateway
        .register_schema("user", Schema::new("users", "u").with_primary_key("id"))
        .unwrap();
    gateway
        .sqlite_backend()
        .unwrap()
        .execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
             INSERT INTO users (name) VALUES ('Ann'), ('Bo');",
        )
        .unwrap();
    gateway
}

fn each_backend() -> Vec<QueryGateway> {
    vec![mock_gateway_with_users(), sqlite_gateway_with_users()]
}

#[test]
fn test_lookup_save_and_filter_lifecycle() {
    for gateway in each_backend() {
        // negated lookup skips the first row
        let mut params = Params::new();
        params.insert("not_id", 1);
        let bo = gateway.get_one("user", &params, false).unwrap().unwrap();
        assert_eq!(bo.get("name"), Some(&Value::from("Bo")));

        // substring filter is case-sensitive: "Ann" matches, "Bo" does not
        let mut params = Params::new();
        params.insert("like_name", "n");
        let result = gateway
            .get_many("user", &params, &QueryOptions::default())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.records[0].get("name"), Some(&Value::from("Ann")));

        // a fresh record gets the next key
        let mut cy = gateway.create("user", [("name", "Cy")]).unwrap();
        gateway.save(&mut cy).unwrap();
        assert_eq!(cy.get("id"), Some(&Value::Int(3)));
        assert!(cy.is_persisted());

        // saving again updates in place
        cy.set("name", "Cyrus");
        gateway.save(&mut cy).unwrap();
        let mut params = Params::new();
        params.insert("id", 3);
        let reloaded = gateway.get_one("user", &params, false).unwrap().unwrap();
        assert_eq!(reloaded.get("name"), Some(&Value::from("Cyrus")));
    }
}

#[test]
fn test_pagination_reports_total_before_window() {
    for gateway in each_backend() {
        for name in ["Cy", "Di", "Ed"] {
            let mut record = gateway.create("user", [("name", name)]).unwrap();
            gateway.save(&mut record).unwrap();
        }

        let result = gateway
            .get_many(
                "user",
                &Params::new(),
                &QueryOptions::default()
                    .with_sort("name", SortDirection::Desc)
                    .with_limit(2)
                    .with_offset(1),
            )
            .unwrap();

        assert_eq!(result.total_count, 5);
        let names: Vec<_> = result
            .records
            .iter()
            .map(|r| r.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![Value::from("Di"), Value::from("Cy")]);
    }
}

#[test]
fn test_unsafe_delete_rejected_on_both_backends() {
    for gateway in each_backend() {
        assert!(matches!(
            gateway.delete("user", &Params::new()).unwrap_err(),
            Error::UnsafeDeleteRejected { .. }
        ));

        let mut params = Params::new();
        params.insert("id", 2);
        assert_eq!(gateway.delete("user", &params).unwrap(), 1);
    }
}

#[test]
fn test_transaction_commit_and_rollback() {
    for gateway in each_backend() {
        let count = |gateway: &QueryGateway| {
            gateway
                .get_many("user", &Params::new(), &QueryOptions::default())
                .unwrap()
                .total_count
        };

        gateway.begin_transaction().unwrap();
        let mut record = gateway.create("user", [("name", "Cy")]).unwrap();
        gateway.save(&mut record).unwrap();
        gateway.commit().unwrap();
        assert_eq!(count(&gateway), 3);

        gateway.begin_transaction().unwrap();
        let mut params = Params::new();
        params.insert("is_not_null_name", 1);
        gateway.delete("user", &params).unwrap();
        assert_eq!(count(&gateway), 0);
        gateway.rollback().unwrap();
        assert_eq!(count(&gateway), 3);
    }
}

#[test]
fn test_transaction_state_errors() {
    for gateway in each_backend() {
        assert!(matches!(
            gateway.commit().unwrap_err(),
            Error::TransactionState(_)
        ));
        assert!(matches!(
            gateway.rollback().unwrap_err(),
            Error::TransactionState(_)
        ));

        gateway.begin_transaction().unwrap();
        assert!(matches!(
            gateway.begin_transaction().unwrap_err(),
            Error::TransactionState(_)
        ));
        gateway.commit().unwrap();
    }
}

#[test]
fn test_raw_query_executes_sql_on_relational_backend_only() {
    let gateway = sqlite_gateway_with_users();
    let records = gateway
        .get_many_by_raw_query(
            "user",
            "SELECT id, name FROM users WHERE name LIKE ? ORDER BY id",
            &[Value::from("%o%")],
        )
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&Value::from("Bo")));

    // the mock store has no SQL engine: the statement is ignored and the
    // whole table comes back
    let gateway = mock_gateway_with_users();
    let records = gateway
        .get_many_by_raw_query("user", "SELECT id, name FROM users WHERE name LIKE ?", &[])
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_for_update_accepted_by_relational_backend() {
    let gateway = sqlite_gateway_with_users();
    let mut params = Params::new();
    params.insert("id", 1);
    let locked = gateway.get_one("user", &params, true).unwrap().unwrap();
    assert_eq!(locked.get("name"), Some(&Value::from("Ann")));
}

#[test]
fn test_joined_columns_read_but_never_written() {
    let mut gateway = QueryGateway::sqlite_in_memory().unwrap();
    gateway
        .register_schema(
            "post",
            Schema::new("posts", "p").with_primary_key("id").with_join(
                JoinDefinition::new(JoinKind::Left, "users", "u", "{alias}.id = p.author_id")
                    .with_column("name", "author_name"),
            ),
        )
        .unwrap();
    gateway
        .sqlite_backend()
        .unwrap()
        .execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
             CREATE TABLE posts (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 title TEXT,
                 author_id INTEGER
             );
             INSERT INTO users (name) VALUES ('Ann');
             INSERT INTO posts (title, author_id) VALUES ('hello', 1), ('orphan', NULL);",
        )
        .unwrap();

    let result = gateway
        .get_many(
            "post",
            &Params::new(),
            &QueryOptions::default().with_sort("id", SortDirection::Asc),
        )
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.records[0].get("author_name"),
        Some(&Value::from("Ann"))
    );
    assert_eq!(result.records[1].get("author_name"), Some(&Value::Null));

    // updating a fetched record must not try to write the join output alias
    let mut post = result.records[0].clone();
    post.set("title", "hello again");
    gateway.save(&mut post).unwrap();

    let mut params = Params::new();
    params.insert("id", 1);
    let reloaded = gateway.get_one("post", &params, false).unwrap().unwrap();
    assert_eq!(reloaded.get("title"), Some(&Value::from("hello again")));
    assert_eq!(reloaded.get("author_name"), Some(&Value::from("Ann")));
}

#[test]
fn test_fault_injection_surfaces_backend_errors() {
    let gateway = mock_gateway_with_users();
    let store = gateway.mock_store().unwrap();

    store.fail_next_select("user");
    assert!(matches!(
        gateway
            .get_many("user", &Params::new(), &QueryOptions::default())
            .unwrap_err(),
        Error::Backend { .. }
    ));

    // one-shot: the next call succeeds
    assert_eq!(
        gateway
            .get_many("user", &Params::new(), &QueryOptions::default())
            .unwrap()
            .len(),
        2
    );

    store.fail_next_save("user");
    let mut record = gateway.create("user", [("name", "Cy")]).unwrap();
    assert!(gateway.save(&mut record).is_err());

    store.fail_next_delete("user");
    let mut params = Params::new();
    params.insert("id", 1);
    assert!(gateway.delete("user", &params).is_err());
}

#[test]
fn test_gateway_from_config_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "backend = \"mock\"").unwrap();

    let config = rowgate::GatewayConfig::load_from_file(file.path()).unwrap();
    let gateway = QueryGateway::from_config(&config).unwrap();
    assert!(gateway.mock_store().is_some());
}
