use std::path::{Path, PathBuf};
use strata_core::{AdapterError, Storage, StorageError, Value, XmlAdapter};
use tempfile::TempDir;

const CATALOG: &str = "<catalog>
    <item><id>1</id><title>alpha</title><price>10</price><active>1</active></item>
    <item><id>2</id><title>beta</title><price>25</price><active>0</active></item>
    <item><id>3</id><title>gamma</title><price>40</price><active>1</active></item>
</catalog>";

fn fixture(xml: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.xml");
    std::fs::write(&path, xml).unwrap();
    (dir, path)
}

fn item_storage(path: &Path, container: &str) -> Storage {
    let adapter = XmlAdapter::new(path);
    let mut storage = Storage::new(Box::new(adapter), container);
    storage.field("id", true, 'i', true, true, None).unwrap();
    storage.field("title", true, 's', false, false, None).unwrap();
    storage.field("price", false, 'd', false, false, None).unwrap();
    storage.field("active", false, 'i', false, false, None).unwrap();
    storage
}

#[test]
fn reads_every_node_of_the_container() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    storage.read();
    let items = storage.execute().unwrap().records().unwrap();

    assert_eq!(items.len(), 3);
    // XML sources hydrate text; typing applies when conditions compare.
    assert_eq!(items.get(0).unwrap().get("title"), Value::Text("alpha".into()));
    assert_eq!(items.get(2).unwrap().get("price"), Value::Text("40".into()));
}

#[test]
fn typed_condition_compares_numerically() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    storage.read();
    storage
        .condition_with("price", Value::Integer(20), ">", "&&")
        .unwrap();
    let items = storage.execute().unwrap().records().unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items.get(0).unwrap().get("id"), Value::Text("2".into()));
}

#[test]
fn conditions_join_strictly_left_to_right() {
    let (_dir, path) = fixture(CATALOG);

    // active == 0 || price > 20, then && active == 1: the disjunction result
    // feeds the conjunction, so only active rows above the price bar remain.
    let mut storage = item_storage(&path, "item");
    storage.read();
    storage.condition("active", Value::Integer(0)).unwrap();
    storage
        .condition_with("price", Value::Integer(20), ">", "||")
        .unwrap();
    storage
        .condition_with("active", Value::Integer(1), "==", "&&")
        .unwrap();
    let items = storage.execute().unwrap().records().unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items.get(0).unwrap().get("id"), Value::Text("3".into()));
}

#[test]
fn offset_and_limit_window_the_matches() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    storage.read();
    storage.limit(1, Some(1));
    let items = storage.execute().unwrap().records().unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items.get(0).unwrap().get("id"), Value::Text("2".into()));
}

#[test]
fn count_reports_matching_nodes() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    storage.count();
    storage.condition("active", Value::Integer(1)).unwrap();
    assert_eq!(storage.execute().unwrap().count().unwrap(), 2);
}

#[test]
fn key_field_keys_hydrated_records() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    storage.read();
    storage.key_field("id").unwrap();
    let items = storage.execute().unwrap().records().unwrap();

    let beta = items.get_by_key(&Value::Text("2".into())).unwrap();
    assert_eq!(beta.get("title"), Value::Text("beta".into()));
}

#[test]
fn write_operations_fail_fast_as_unsupported() {
    let (_dir, path) = fixture(CATALOG);
    let mut storage = item_storage(&path, "item");

    let mut record = storage.create_record();
    record.set("title", "delta");
    storage.insert(record).unwrap();
    let err = storage.execute().unwrap_err();
    assert!(matches!(
        err,
        StorageError::Adapter(AdapterError::Unsupported { adapter: "xml", .. })
    ));
}

#[test]
fn container_path_descends_nested_elements() {
    let nested = "<library>
        <shelf>
            <item><id>1</id><title>inner</title></item>
        </shelf>
        <item><id>9</id><title>outer</title></item>
    </library>";
    let (_dir, path) = fixture(nested);

    let adapter = XmlAdapter::new(&path);
    let mut storage = Storage::new(Box::new(adapter), "shelf_item");
    storage.field("id", true, 'i', true, true, None).unwrap();
    storage.field("title", true, 's', false, false, None).unwrap();

    storage.read();
    let items = storage.execute().unwrap().records().unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items.get(0).unwrap().get("title"), Value::Text("inner".into()));
}
