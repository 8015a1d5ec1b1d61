//! End-to-end conversion runs against the in-memory store

use docmap::storage::memory::StoredRow;
use docmap::storage::ColumnDescription;
use docmap::{
    ConvertOptions, Converter, DescriptorDef, DiagnosticKind, DirectorySource, DocumentErrorPolicy, InputDocument,
    MappingTree, MemoryStore, RowId, RunEvent, RunLog, RunStatus,
};
use std::fs;
use std::sync::mpsc;

const ENCOUNTER_MAPPING: &str = r#"
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
"#;

const ENCOUNTER_XML: &str = r#"<Encounter id="123">
  <diagnosis code="A01"/>
  <diagnosis code="B02"/>
</Encounter>"#;

fn tree(yaml: &str) -> MappingTree {
    MappingTree::build(&DescriptorDef::from_yaml_str(yaml).unwrap()).unwrap()
}

fn documents(items: &[(&str, &str)]) -> Vec<Result<InputDocument, docmap::ConvertError>> {
    items
        .iter()
        .map(|(name, text)| Ok(InputDocument::new(*name, *text)))
        .collect()
}

fn texts<'a>(rows: &'a [StoredRow], column: &str) -> Vec<Option<&'a str>> {
    rows.iter().map(|row| row.text(column)).collect()
}

#[test]
fn test_encounter_with_two_diagnoses() {
    let tree = tree(ENCOUNTER_MAPPING);
    let mut store = MemoryStore::new().with_foreign_key_checks();

    let report = Converter::new(&tree).convert(
        &mut store,
        documents(&[("encounter.xml", ENCOUNTER_XML)]),
        RunLog::new(),
    );

    assert_eq!(report.status, RunStatus::Completed);

    let encounters = store.rows("Encounter");
    assert_eq!(encounters.len(), 1);
    assert_eq!(encounters[0].id, RowId(1));
    assert_eq!(encounters[0].text("PatientId"), Some("123"));
    assert_eq!(encounters[0].text("fileName"), Some("encounter.xml"));

    let diagnoses = store.rows("Diagnosis");
    assert_eq!(diagnoses.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RowId(1), RowId(2)]);
    assert!(diagnoses.iter().all(|r| r.key("EncounterId") == Some(RowId(1))));
    assert_eq!(texts(diagnoses, "Code"), vec![Some("A01"), Some("B02")]);

    assert_eq!(report.rows_in("Encounter"), 1);
    assert_eq!(report.rows_in("Diagnosis"), 2);
    assert_eq!(report.failed_inserts, 0);
}

#[test]
fn test_rows_follow_each_parent() {
    let tree = tree(
        r#"
table: Record
groups:
  - table: Section
    context: "/record/section"
    columns:
      - name: Title
        value: "title"
    groups:
      - table: Entry
        context: "entry"
        columns:
          - name: Text
            value: "."
            narrative: true
"#,
    );
    let xml = r#"<record>
  <section><title>Problems</title><entry><p>A</p><p>B</p></entry><entry>C</entry></section>
  <section><title>Allergies</title><entry>D</entry></section>
  <section><title>Empty</title></section>
</record>"#;

    let mut store = MemoryStore::new().with_foreign_key_checks();
    let report = Converter::new(&tree).convert(&mut store, documents(&[("r.xml", xml)]), RunLog::new());

    let sections = store.rows("Section");
    assert_eq!(texts(sections, "Title"), vec![Some("Problems"), Some("Allergies"), Some("Empty")]);

    let entries = store.rows("Entry");
    assert_eq!(texts(entries, "Text"), vec![Some("A B"), Some("C"), Some("D")]);
    let parents: Vec<Option<RowId>> = entries.iter().map(|r| r.key("SectionId")).collect();
    assert_eq!(parents, vec![Some(sections[0].id), Some(sections[0].id), Some(sections[1].id)]);

    // The third section has no entries
    let no_data: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::NoGroupData)
        .collect();
    assert_eq!(no_data.len(), 1);
    assert_eq!(no_data[0].document.as_deref(), Some("r.xml"));
}

#[test]
fn test_schema_mismatch_writes_nothing() {
    let tree = tree(ENCOUNTER_MAPPING);
    let mut store = MemoryStore::new();
    store.define_table(
        "Encounter",
        vec![
            ColumnDescription { name: "id".to_string(), long_text: false },
            ColumnDescription { name: "fileName".to_string(), long_text: false },
        ],
    );

    let (tx, rx) = mpsc::channel();
    let report = Converter::new(&tree).convert(
        &mut store,
        documents(&[("encounter.xml", ENCOUNTER_XML)]),
        RunLog::with_channel(tx),
    );

    assert_eq!(report.status, RunStatus::SchemaFailed);
    assert_eq!(report.total_rows(), 0);
    assert!(report.documents.is_empty());
    assert_eq!(store.row_count("Encounter"), 0);
    assert!(!store.table_names().contains(&"Diagnosis"));

    let mismatch = report
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::SchemaMismatch)
        .unwrap();
    assert_eq!(
        mismatch.message,
        "Could not find correct definition of column PATIENTID in table Encounter"
    );

    let events: Vec<RunEvent> = rx.iter().collect();
    assert_eq!(events.last(), Some(&RunEvent::Completed(RunStatus::SchemaFailed)));
    assert_eq!(
        events.iter().filter(|e| matches!(e, RunEvent::Completed(_))).count(),
        1
    );
}

#[test]
fn test_second_run_reuses_existing_tables() {
    let tree = tree(ENCOUNTER_MAPPING);
    let mut store = MemoryStore::new();
    let converter = Converter::new(&tree);

    converter.convert(&mut store, documents(&[("a.xml", ENCOUNTER_XML)]), RunLog::new());
    let report = converter.convert(&mut store, documents(&[("b.xml", ENCOUNTER_XML)]), RunLog::new());

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(store.row_count("Encounter"), 2);
    assert_eq!(store.rows("Diagnosis")[3].key("EncounterId"), Some(RowId(2)));
}

#[test]
fn test_reserved_column_is_reported_and_still_processed() {
    let tree = tree(
        r#"
table: Encounter
groups:
  - table: Diagnosis
    context: ".//diagnosis"
    columns:
      - name: Code
        value: "@code"
      - name: ID
        value: "@code"
"#,
    );
    let mut store = MemoryStore::new();
    let report = Converter::new(&tree).convert(
        &mut store,
        documents(&[("encounter.xml", ENCOUNTER_XML)]),
        RunLog::new(),
    );

    let reserved = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ReservedColumn)
        .count();
    assert_eq!(reserved, 1);

    // The value is still sent to the store, which refuses to overwrite the generated key
    assert_eq!(report.failed_inserts, 2);
    assert_eq!(store.row_count("Diagnosis"), 0);
    assert_eq!(report.status, RunStatus::Completed);
}

#[test]
fn test_parent_key_column_keeps_generated_key() {
    let tree = tree(
        r#"
table: Encounter
groups:
  - table: Diagnosis
    context: ".//diagnosis"
    columns:
      - name: EncounterId
        value: "@ref"
      - name: Code
        value: "@code"
"#,
    );
    let xml = r#"<Encounter id="123"><diagnosis ref="77" code="A01"/></Encounter>"#;

    let mut store = MemoryStore::new().with_foreign_key_checks();
    let report = Converter::new(&tree).convert(&mut store, documents(&[("encounter.xml", xml)]), RunLog::new());

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.failed_inserts, 0);
    assert_eq!(
        report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ReservedColumn)
            .count(),
        1
    );

    let diagnoses = store.rows("Diagnosis");
    assert_eq!(diagnoses.len(), 1);
    assert_eq!(diagnoses[0].key("EncounterId"), Some(RowId(1)));
    assert_eq!(diagnoses[0].text("Code"), Some("A01"));
}

#[test]
fn test_directory_run_with_skipped_bad_document() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("01.xml"), ENCOUNTER_XML).unwrap();
    fs::write(dir.path().join("02.xml"), "<Encounter id=").unwrap();
    fs::write(dir.path().join("03.xml"), r#"<Encounter id="456"><diagnosis code="C03"/></Encounter>"#).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a document").unwrap();

    let tree = tree(ENCOUNTER_MAPPING);
    let source = DirectorySource::new(dir.path(), "*.xml").unwrap();
    let options = ConvertOptions {
        document_policy: DocumentErrorPolicy::SkipDocument,
        ..ConvertOptions::default()
    };

    let mut store = MemoryStore::new();
    let report = Converter::with_options(&tree, options).convert(&mut store, source.documents(), RunLog::new());

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.documents.len(), 3);
    assert_eq!(texts(store.rows("Encounter"), "fileName"), vec![Some("01.xml"), Some("03.xml")]);
    assert_eq!(store.rows("Diagnosis")[2].key("EncounterId"), Some(RowId(2)));

    let json = report.to_json_pretty().unwrap();
    assert!(json.contains("\"state\": \"failed\""));
}

#[test]
fn test_sample_cda_mapping() {
    let mapping = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/encounter/mapping.yaml");
    let tree = MappingTree::build(&docmap::load_descriptor(&mapping).unwrap()).unwrap();
    assert!(tree.lint("fileName").is_empty());

    let xml = r#"<ClinicalDocument xmlns="urn:hl7-org:v3"><id extension="E-17"/><title>Discharge summary</title><effectiveTime value="20240501"/><component><structuredBody><component><section><code code="30954-2"/><title>Results</title><text><p>Glucose raised.</p><p>Repeat in 3 months.</p></text><entry><observation><code code="2345-7" displayName="Glucose"/><value value="7.2"/><statusCode code="completed"/></observation></entry><entry><observation><code code="4548-4" displayName="HbA1c"/><value value="6.1"/></observation></entry></section></component><component><section><code code="10160-0"/><title>Medications</title></section></component></structuredBody></component></ClinicalDocument>"#;

    let mut store = MemoryStore::new().with_foreign_key_checks();
    let report = Converter::new(&tree).convert(&mut store, documents(&[("summary.xml", xml)]), RunLog::new());
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.failed_inserts, 0);

    let header = &store.rows("Encounter")[0];
    assert_eq!(header.text("DocumentId"), Some("E-17"));
    assert_eq!(header.text("Title"), Some("Discharge summary"));
    assert_eq!(header.text("EffectiveTime"), Some("20240501"));

    let sections = store.rows("Section");
    assert_eq!(texts(sections, "Code"), vec![Some("30954-2"), Some("10160-0")]);
    assert_eq!(sections[0].text("Narrative"), Some("Glucose raised. Repeat in 3 months."));
    assert_eq!(sections[1].text("Narrative"), Some(""));

    let observations = store.rows("Observation");
    assert_eq!(texts(observations, "Code"), vec![Some("Glucose"), Some("HbA1c")]);
    assert_eq!(texts(observations, "Value"), vec![Some("7.2"), Some("6.1")]);
    assert_eq!(texts(observations, "Status"), vec![Some("completed"), Some("")]);
    assert!(observations.iter().all(|r| r.key("SectionId") == Some(sections[0].id)));
}
