use std::fs;
use std::path::Path;

use rstest::rstest;
use soc_config::{
    OCV_FILES, PARAM_FILES, load_ocv_rows, load_param_rows, load_row_csv, load_trace_csv,
};
use tempfile::tempdir;

fn write_rows(dir: &Path, files: &[&str], line: &str) {
    for name in files {
        fs::write(dir.join(name), format!("{line}\n")).unwrap();
    }
}

#[rstest]
fn loads_both_tables_in_row_order() {
    let dir = tempdir().unwrap();
    write_rows(dir.path(), &PARAM_FILES, "1.0, 2.0, 3.0");
    fs::write(dir.path().join("CellModeltemps.csv"), "-5,25,45\n").unwrap();
    write_rows(dir.path(), &OCV_FILES, "0.0,0.5,1.0,");

    let params = load_param_rows(dir.path()).unwrap();
    assert_eq!(params.len(), 9);
    assert_eq!(params[8], vec![-5.0, 25.0, 45.0]);

    let ocv = load_ocv_rows(dir.path()).unwrap();
    assert_eq!(ocv.len(), 8);
    // trailing comma does not add a column
    assert_eq!(ocv[0].len(), 3);
}

#[rstest]
fn ragged_rows_are_rejected() {
    let dir = tempdir().unwrap();
    write_rows(dir.path(), &PARAM_FILES, "1,2,3");
    fs::write(dir.path().join("CellModelRParam.csv"), "1,2\n").unwrap();
    let err = load_param_rows(dir.path()).unwrap_err();
    assert!(format!("{err}").contains("CellModelRParam.csv has 2 columns"));
}

#[rstest]
fn ocv_table_needs_two_breakpoints() {
    let dir = tempdir().unwrap();
    write_rows(dir.path(), &OCV_FILES, "3.7");
    let err = load_ocv_rows(dir.path()).unwrap_err();
    assert!(format!("{err}").contains("at least 2 columns"));
}

#[rstest]
fn missing_file_names_the_path() {
    let dir = tempdir().unwrap();
    let err = load_param_rows(dir.path()).unwrap_err();
    assert!(format!("{err}").contains("CellModelQParam.csv"));
}

#[rstest]
#[case("1,abc,3")]
#[case("")]
fn bad_row_file_is_rejected(#[case] body: &str) {
    let dir = tempdir().unwrap();
    let p = dir.path().join("row.csv");
    fs::write(&p, body).unwrap();
    assert!(load_row_csv(&p).is_err());
}

#[rstest]
fn trace_loader_enforces_headers() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("trace.csv");
    fs::write(&good, "current,voltage,temperature\n-1.5,3.71,25\n0.0,3.70,24\n").unwrap();
    let rows = load_trace_csv(&good).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].temperature, 25);
    assert!((rows[1].voltage - 3.70).abs() < 1e-6);

    let bad = dir.path().join("bad.csv");
    fs::write(&bad, "i,v,t\n1,2,3\n").unwrap();
    let err = load_trace_csv(&bad).unwrap_err();
    assert!(format!("{err}").contains("current,voltage,temperature"));
}

#[rstest]
fn trace_without_samples_is_rejected() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("empty.csv");
    fs::write(&p, "current,voltage,temperature\n").unwrap();
    assert!(load_trace_csv(&p).is_err());
}
