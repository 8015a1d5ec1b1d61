//! Integration tests for the SQL store on the SQLite backend
//!
//! Only built when SQLite is the active backend (the default feature set).

#![cfg(all(feature = "sqlite", not(any(feature = "postgres", feature = "mysql"))))]

use diesel::RunQueryDsl;
use docmap::storage::{ColumnSpec, TableSpec};
use docmap::{
    CellValue, Converter, Database, DescriptorDef, Dialect, InputDocument, MappingTree, Row, RowId, RunLog, RunStatus,
    SqlStore, Store, StoreError,
};

fn open(dir: &tempfile::TempDir) -> SqlStore {
    let path = dir.path().join("records.db");
    SqlStore::connect(path.to_str().unwrap()).expect("Failed to open SQLite database")
}

fn diagnosis_spec() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: "Encounter".to_string(),
            parent: None,
            columns: vec![ColumnSpec::new("fileName", false)],
        },
        TableSpec {
            name: "Diagnosis".to_string(),
            parent: Some("Encounter".to_string()),
            columns: vec![ColumnSpec::new("Code", false), ColumnSpec::new("Note", true)],
        },
    ]
}

#[test]
fn test_create_describe_and_insert() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    assert_eq!(store.dialect(), Dialect::Sqlite);

    assert!(!store.table_exists("Encounter").unwrap());
    for spec in diagnosis_spec() {
        store.create_table(&spec).unwrap();
    }
    assert!(store.table_exists("encounter").unwrap());

    let columns = store.describe_columns("Diagnosis").unwrap();
    let described: Vec<(&str, bool)> = columns.iter().map(|c| (c.name.as_str(), c.long_text)).collect();
    assert_eq!(
        described,
        vec![("id", false), ("EncounterId", false), ("Code", false), ("Note", true)]
    );

    let mut header = Row::new();
    header.insert("fileName".to_string(), CellValue::Text(Some("a.xml".to_string())));
    let encounter = store.insert_row("Encounter", &header).unwrap();
    assert_eq!(encounter, RowId(1));

    let mut row = Row::new();
    row.insert("EncounterId".to_string(), CellValue::Key(encounter));
    row.insert("Code".to_string(), CellValue::Text(Some("O'Brien; DROP TABLE x".to_string())));
    row.insert("Note".to_string(), CellValue::Text(None));
    assert_eq!(store.insert_row("Diagnosis", &row).unwrap(), RowId(1));
    assert_eq!(store.insert_row("Diagnosis", &row).unwrap(), RowId(2));
}

#[test]
fn test_foreign_keys_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    for spec in diagnosis_spec() {
        store.create_table(&spec).unwrap();
    }

    let mut orphan = Row::new();
    orphan.insert("EncounterId".to_string(), CellValue::Key(RowId::INVALID));
    assert!(matches!(store.insert_row("Diagnosis", &orphan), Err(StoreError::Query(_))));

    assert!(matches!(
        store.describe_columns("Missing"),
        Err(StoreError::UnknownTable(_))
    ));
}

#[test]
fn test_conversion_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let tree = MappingTree::build(
        &DescriptorDef::from_yaml_str(
            r#"
table: Encounter
columns:
  - name: PatientId
    value: "@id"
groups:
  - table: Diagnosis
    context: ".//diagnosis"
    columns:
      - name: Code
        value: "@code"
"#,
        )
        .unwrap(),
    )
    .unwrap();

    let xml = r#"<Encounter id="123"><diagnosis code="A01"/><diagnosis code="B02"/></Encounter>"#;
    let converter = Converter::new(&tree);

    let mut store = open(&dir);
    let report = converter.convert(
        &mut store,
        vec![Ok(InputDocument::new("encounter.xml", xml))],
        RunLog::new(),
    );
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.rows_in("Encounter"), 1);
    assert_eq!(report.rows_in("Diagnosis"), 2);
    drop(store);

    // A second run validates the tables created by the first
    let mut store = open(&dir);
    let report = converter.convert(
        &mut store,
        vec![Ok(InputDocument::new("again.xml", xml))],
        RunLog::new(),
    );
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.rows_in("Diagnosis"), 2);
    assert_eq!(store.describe_columns("Encounter").unwrap().len(), 3);
}

#[test]
fn test_existing_table_with_other_spelling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let database = Database::new(path.to_str().unwrap()).unwrap();
    let mut conn = database.get_connection().unwrap();
    diesel::sql_query(
        "CREATE TABLE encounter (id INTEGER PRIMARY KEY AUTOINCREMENT, filename VARCHAR(255), patientid VARCHAR(255))",
    )
    .execute(&mut *conn)
    .unwrap();
    drop(conn);

    let tree = MappingTree::build(
        &DescriptorDef::from_yaml_str(
            r#"
table: Encounter
columns:
  - name: PatientId
    value: "@id"
"#,
        )
        .unwrap(),
    )
    .unwrap();

    let mut store = SqlStore::new(&database).unwrap();
    let report = Converter::new(&tree).convert(
        &mut store,
        vec![Ok(InputDocument::new("a.xml", r#"<Encounter id="7"/>"#))],
        RunLog::new(),
    );

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.failed_inserts, 0);
    assert_eq!(report.rows_in("Encounter"), 1);

    let columns: Vec<String> = store
        .describe_columns("ENCOUNTER")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["id", "filename", "patientid"]);
}
