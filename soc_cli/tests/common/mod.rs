#![allow(dead_code)]
// Fixture files shared by the CLI tests.
use std::fs;
use std::path::{Path, PathBuf};

const PARAMS: [(&str, &str); 9] = [
    ("CellModelQParam.csv", "2.5,2.5"),
    ("CellModelGParam.csv", "100,100"),
    ("CellModelMParam.csv", "0.01,0.01"),
    ("CellModelM0Param.csv", "0.005,0.005"),
    ("CellModelRCParam.csv", "10,10"),
    ("CellModelRParam.csv", "0.01,0.01"),
    ("CellModelR0Param.csv", "0.02,0.02"),
    ("CellModeletaParam.csv", "0.99,0.99"),
    ("CellModeltemps.csv", "0,40"),
];

const OCV: [(&str, &str); 8] = [
    ("CellModelOCV.csv", "3.0,3.4,3.7,4.2"),
    ("CellModelOCV0.csv", "3.0,3.4,3.7,4.2"),
    ("CellModelOCVrel.csv", "0,0,0,0"),
    ("CellModelSOC.csv", "0,0.2,0.6,1.0"),
    ("CellModelSOC0.csv", "0,0.2,0.6,1.0"),
    ("CellModelSOCrel.csv", "0,0,0,0"),
    ("CellModeldOCV0.csv", "2.0,1.5,0.75,1.25"),
    ("CellModeldOCVrel.csv", "0,0,0,0"),
];

/// Write all cell-model tables into `dir/csv` and return that directory.
pub fn write_tables(dir: &Path) -> PathBuf {
    let tables = dir.join("csv");
    fs::create_dir_all(&tables).unwrap();
    for (name, line) in PARAMS.iter().chain(OCV.iter()) {
        fs::write(tables.join(name), format!("{line}\n")).unwrap();
    }
    tables
}

/// Minimal sim-backend config for a `par x ser` pack.
pub fn write_config(dir: &Path, par: usize, ser: usize) -> PathBuf {
    let toml = format!(
        r#"
[pack]
par = {par}
ser = {ser}

[bus]
backend = "sim"
slave_address = 1

[schedule]
period_ms = 1

[balancing]
soc_range = 0.05
"#
    );
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Trace with `rows` samples at a constant 1 A discharge.
pub fn write_trace(dir: &Path, rows: usize) -> PathBuf {
    let mut s = String::from("current,voltage,temperature\n");
    for _ in 0..rows {
        s.push_str("1.0,3.7,25\n");
    }
    let path = dir.join("trace.csv");
    fs::write(&path, s).unwrap();
    path
}
