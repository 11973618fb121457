use strata_core::{DummyAdapter, Storage, Value};

fn stub_storage(adapter: DummyAdapter) -> Storage {
    let mut storage = Storage::new(Box::new(adapter), "book");
    storage.field("id", true, 'i', true, true, None).unwrap();
    storage.field("title", true, 's', false, false, None).unwrap();
    storage.field("cover", false, 's', false, false, None).unwrap();
    storage.field("language", false, 's', false, false, None).unwrap();
    storage
}

#[test]
fn count_with_limit_doubles_the_limit() {
    let mut storage = stub_storage(DummyAdapter::with_seed(1));

    storage.count();
    storage.limit(4, None);
    assert_eq!(storage.execute().unwrap().count().unwrap(), 8);
}

#[test]
fn stub_records_follow_property_conventions() {
    let mut storage = stub_storage(DummyAdapter::with_seed(1));

    storage.read();
    storage.limit(2, None);
    let records = storage.execute().unwrap().records().unwrap();

    assert_eq!(records.len(), 2);
    let first = records.get(0).unwrap();
    assert_eq!(first.get("id"), Value::Integer(1));
    assert_eq!(first.get("title"), Value::Text("title".into()));
    assert_eq!(first.get("cover"), Value::Null);
    assert_eq!(first.get("language"), Value::Text("pl".into()));

    let second = records.get(1).unwrap();
    assert_eq!(second.get("id"), Value::Integer(2));
}

#[test]
fn read_without_limit_stubs_three_records() {
    let mut storage = stub_storage(DummyAdapter::with_seed(1));

    storage.read();
    let records = storage.execute().unwrap().records().unwrap();
    assert_eq!(records.len(), 3);
}

#[test]
fn seeded_adapters_are_deterministic() {
    let mut first = stub_storage(DummyAdapter::with_seed(7));
    let mut second = stub_storage(DummyAdapter::with_seed(7));

    first.count();
    second.count();
    assert_eq!(
        first.execute().unwrap().count().unwrap(),
        second.execute().unwrap().count().unwrap()
    );
}

#[test]
fn insert_assigns_a_stubbed_identifier() {
    let mut storage = stub_storage(DummyAdapter::with_seed(7));

    let mut record = storage.create_record();
    record.set("title", "stubbed");
    storage.insert(record).unwrap();
    let written = storage.execute().unwrap().record().unwrap();

    match written.get("id") {
        Value::Integer(id) => assert!((1..=100).contains(&id)),
        other => panic!("expected integer identifier, got {other:?}"),
    }
}

#[test]
fn update_and_delete_report_success() {
    let mut storage = stub_storage(DummyAdapter::with_seed(7));

    let mut record = storage.create_record();
    record.set("id", 1i64);
    record.set("title", "stubbed");

    storage.update(record.clone()).unwrap();
    storage.execute().unwrap().record().unwrap();

    storage.delete(record).unwrap();
    assert!(storage.execute().unwrap().deleted().unwrap());
}
