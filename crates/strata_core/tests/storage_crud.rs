use rusqlite::Connection;
use strata_core::{
    InlineSqlAdapter, PreparedSqlAdapter, QueryError, Storage, StorageError, Value,
};

fn page_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE page (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            visible INTEGER,
            price REAL
        );",
    )
    .unwrap();
    conn
}

fn page_fields(storage: &mut Storage) {
    storage.field("id", true, 'i', true, true, None).unwrap();
    storage.field("title", true, 's', false, false, None).unwrap();
    storage.field("visible", false, 'i', false, false, None).unwrap();
    storage.field("price", false, 'd', false, false, None).unwrap();
}

fn page_storage() -> Storage {
    let adapter = PreparedSqlAdapter::from_connection(page_connection(), None);
    let mut storage = Storage::new(Box::new(adapter), "page");
    page_fields(&mut storage);
    storage
}

#[test]
fn write_without_identifier_inserts_and_identifies() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("title", "home");
    storage.write(record).unwrap();
    let written = storage.execute().unwrap().record().unwrap();

    assert_eq!(written.get("id"), Value::Integer(1));
    assert_eq!(written.get("title"), Value::Text("home".into()));

    storage.read_one();
    storage.condition("id", Value::Integer(1)).unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("title"), Value::Text("home".into()));
}

#[test]
fn write_with_unmatched_identifier_still_inserts() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("id", 5i64);
    record.set("title", "explicit");
    storage.write(record).unwrap();
    storage.execute().unwrap();

    storage.count();
    let total = storage.execute().unwrap().count().unwrap();
    assert_eq!(total, 1);

    storage.read_one();
    storage.condition("id", Value::Integer(5)).unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("title"), Value::Text("explicit".into()));
}

#[test]
fn write_with_matched_identifier_updates_in_place() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("title", "draft");
    storage.write(record).unwrap();
    let written = storage.execute().unwrap().record().unwrap();

    let mut changed = storage.create_record();
    changed.set("id", written.get("id"));
    changed.set("title", "published");
    storage.write(changed).unwrap();
    storage.execute().unwrap();

    storage.count();
    assert_eq!(storage.execute().unwrap().count().unwrap(), 1);

    storage.read_one();
    storage.condition("id", written.get("id")).unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("title"), Value::Text("published".into()));
}

#[test]
fn write_with_ambiguous_identifier_is_non_unique() {
    let adapter = PreparedSqlAdapter::from_connection(page_connection(), None);
    let mut storage = Storage::new(Box::new(adapter), "page");
    // visible is deliberately registered as the primary field even though the
    // column carries duplicates.
    storage.field("title", true, 's', false, false, None).unwrap();
    storage.field("visible", false, 'i', true, true, None).unwrap();

    for title in ["a", "b"] {
        let mut record = storage.create_record();
        record.set("title", title);
        record.set("visible", 1i64);
        storage.insert(record).unwrap();
        storage.execute().unwrap();
    }

    let mut record = storage.create_record();
    record.set("title", "c");
    record.set("visible", 1i64);
    let err = storage.write(record).unwrap_err();
    assert!(matches!(err, StorageError::NonUnique { matches: 2, .. }));
}

#[test]
fn read_one_on_empty_result_is_out_of_range() {
    let mut storage = page_storage();

    storage.read_one();
    storage.condition("id", Value::Integer(42)).unwrap();
    let err = storage.execute().unwrap_err();
    assert!(matches!(err, StorageError::OutOfRange));
}

#[test]
fn unregistered_field_is_rejected_at_call_time() {
    let mut storage = page_storage();

    let err = storage.condition("bogus", Value::Integer(1)).unwrap_err();
    assert!(matches!(err, StorageError::UnknownField(field) if field == "bogus"));

    let err = storage.order("bogus", "asc").unwrap_err();
    assert!(matches!(err, StorageError::UnknownField(_)));

    let err = storage.fields(&["bogus"]).unwrap_err();
    assert!(matches!(err, StorageError::UnknownField(_)));
}

#[test]
fn unknown_operator_is_rejected_at_call_time() {
    let mut storage = page_storage();

    let err = storage
        .condition_with("id", Value::Integer(1), "~=", "&&")
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Query(QueryError::UnknownComparison(_))
    ));
}

#[test]
fn execute_without_operation_is_an_error() {
    let mut storage = page_storage();

    let err = storage.execute().unwrap_err();
    assert!(matches!(
        err,
        StorageError::Query(QueryError::MissingOperation)
    ));
}

#[test]
fn reset_clears_the_pending_operation() {
    let mut storage = page_storage();

    storage.read();
    storage.condition("id", Value::Integer(1)).unwrap();
    storage.reset(false);

    let err = storage.execute().unwrap_err();
    assert!(matches!(
        err,
        StorageError::Query(QueryError::MissingOperation)
    ));
}

#[test]
fn decimal_text_normalizes_before_persisting() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("title", "priced");
    record.set("price", "1 234,56");
    storage.insert(record).unwrap();
    storage.execute().unwrap();

    storage.read_one();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("price"), Value::Real(1234.56));
}

#[test]
fn null_inequality_selects_only_populated_rows() {
    let mut storage = page_storage();

    let mut titled = storage.create_record();
    titled.set("title", "set");
    storage.insert(titled).unwrap();
    storage.execute().unwrap();

    let mut untitled = storage.create_record();
    untitled.set("visible", 1i64);
    storage.insert(untitled).unwrap();
    storage.execute().unwrap();

    storage.read();
    storage.condition_with("title", Value::Null, "!=", "&&").unwrap();
    let records = storage.execute().unwrap().records().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records.get(0).unwrap().get("id"), Value::Integer(1));
    assert_eq!(records.get(0).unwrap().get("title"), Value::Text("set".into()));
}

#[test]
fn delete_removes_the_matched_row() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("title", "gone soon");
    storage.write(record).unwrap();
    let written = storage.execute().unwrap().record().unwrap();

    storage.delete(written).unwrap();
    assert!(storage.execute().unwrap().deleted().unwrap());

    storage.count();
    assert_eq!(storage.execute().unwrap().count().unwrap(), 0);
}

#[test]
fn projection_limits_hydrated_properties() {
    let mut storage = page_storage();

    let mut record = storage.create_record();
    record.set("title", "partial");
    storage.insert(record).unwrap();
    storage.execute().unwrap();

    storage.read_one();
    storage.fields(&["id"]).unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("id"), Value::Integer(1));
    assert_eq!(loaded.get("title"), Value::Null);
}

#[test]
fn order_and_limit_shape_the_result_window() {
    let mut storage = page_storage();

    for title in ["a", "b", "c"] {
        let mut record = storage.create_record();
        record.set("title", title);
        storage.insert(record).unwrap();
        storage.execute().unwrap();
    }

    storage.read();
    storage.order("title", "desc").unwrap();
    storage.limit(2, None);
    let records = storage.execute().unwrap().records().unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records.get(0).unwrap().get("title"), Value::Text("c".into()));
    assert_eq!(records.get(1).unwrap().get("title"), Value::Text("b".into()));
}

#[test]
fn key_field_keys_the_result_collection() {
    let mut storage = page_storage();

    for title in ["a", "b"] {
        let mut record = storage.create_record();
        record.set("title", title);
        storage.insert(record).unwrap();
        storage.execute().unwrap();
    }

    storage.read();
    storage.key_field("title").unwrap();
    let records = storage.execute().unwrap().records().unwrap();

    assert_eq!(records.len(), 2);
    let keyed = records.get_by_key(&Value::Text("b".into())).unwrap();
    assert_eq!(keyed.get("id"), Value::Integer(2));
}

#[test]
fn mapped_field_translates_between_domain_and_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE article (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_title TEXT
        );",
    )
    .unwrap();

    let adapter = PreparedSqlAdapter::from_connection(conn, None);
    let mut storage = Storage::new(Box::new(adapter), "article");
    storage.field("id", true, 'i', true, true, None).unwrap();
    storage
        .field("title", true, 's', false, false, Some("article_title"))
        .unwrap();

    let mut record = storage.create_record();
    record.set("title", "mapped");
    storage.write(record).unwrap();
    storage.execute().unwrap();

    storage.read_one();
    storage.condition("title", Value::Text("mapped".into())).unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("title"), Value::Text("mapped".into()));
}

#[test]
fn tables_and_describe_introspect_the_source() {
    let mut storage = page_storage();

    storage.tables();
    let tables = storage.execute().unwrap().records().unwrap();
    let names: Vec<Value> = tables.iter().map(|t| t.get("name")).collect();
    assert!(names.contains(&Value::Text("page".into())));

    storage.describe();
    let columns = storage.execute().unwrap().records().unwrap();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns.get(0).unwrap().get("name"), Value::Text("id".into()));
    assert_eq!(columns.get(0).unwrap().get("pk"), Value::Integer(1));
}

#[test]
fn inline_adapter_matches_prepared_adapter_behaviour() {
    let adapter = InlineSqlAdapter::from_connection(page_connection(), None);
    let mut storage = Storage::new(Box::new(adapter), "page");
    page_fields(&mut storage);

    let mut record = storage.create_record();
    record.set("title", "it's inline");
    record.set("price", "9,99");
    storage.write(record).unwrap();
    let written = storage.execute().unwrap().record().unwrap();
    assert_eq!(written.get("id"), Value::Integer(1));

    storage.read_one();
    storage
        .condition("title", Value::Text("it's inline".into()))
        .unwrap();
    let loaded = storage.execute().unwrap().record().unwrap();
    assert_eq!(loaded.get("price"), Value::Real(9.99));
}
