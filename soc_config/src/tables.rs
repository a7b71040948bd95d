//! Cell-model CSV loaders.
//!
//! Each named table row lives in its own file holding a single
//! comma-separated line of floats. Both tables require every row to have the
//! same number of columns.
use std::path::Path;

/// Parameter table files in row order: Q, G, M, M0, RC, R, R0, eta, temperatures.
pub const PARAM_FILES: [&str; 9] = [
    "CellModelQParam.csv",
    "CellModelGParam.csv",
    "CellModelMParam.csv",
    "CellModelM0Param.csv",
    "CellModelRCParam.csv",
    "CellModelRParam.csv",
    "CellModelR0Param.csv",
    "CellModeletaParam.csv",
    "CellModeltemps.csv",
];

/// OCV/SoC table files in row order: OCV, OCV0, OCVrel, SOC, SOC0, SOCrel, dOCV0, dOCVrel.
pub const OCV_FILES: [&str; 8] = [
    "CellModelOCV.csv",
    "CellModelOCV0.csv",
    "CellModelOCVrel.csv",
    "CellModelSOC.csv",
    "CellModelSOC0.csv",
    "CellModelSOCrel.csv",
    "CellModeldOCV0.csv",
    "CellModeldOCVrel.csv",
];

/// Read the first line of a headerless CSV file as a row of floats.
/// Empty trailing fields are ignored.
pub fn load_row_csv(path: &Path) -> eyre::Result<Vec<f32>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open table CSV {:?}: {}", path, e))?;

    let mut record = csv::StringRecord::new();
    let found = rdr
        .read_record(&mut record)
        .map_err(|e| eyre::eyre!("read table CSV {:?}: {}", path, e))?;
    if !found {
        eyre::bail!("table CSV {:?} is empty", path);
    }

    let mut row = Vec::with_capacity(record.len());
    for (col, field) in record.iter().enumerate() {
        if field.is_empty() {
            continue;
        }
        let v: f32 = field
            .parse()
            .map_err(|e| {
                eyre::eyre!("table CSV {:?} column {}: '{}': {}", path, col + 1, field, e)
            })?;
        row.push(v);
    }
    if row.is_empty() {
        eyre::bail!("table CSV {:?} has no values", path);
    }
    Ok(row)
}

fn load_rows(dir: &Path, files: &[&str], min_cols: usize) -> eyre::Result<Vec<Vec<f32>>> {
    let mut rows = Vec::with_capacity(files.len());
    for name in files {
        rows.push(load_row_csv(&dir.join(name))?);
    }
    let width = rows.first().map_or(0, Vec::len);
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        eyre::bail!(
            "{} has {} columns, expected {} (same as {})",
            files[i],
            r.len(),
            width,
            files[0]
        );
    }
    if width < min_cols {
        eyre::bail!("cell-model table needs at least {min_cols} columns, got {width}");
    }
    Ok(rows)
}

/// Load the 9-row parameter table from `dir`.
pub fn load_param_rows(dir: &Path) -> eyre::Result<Vec<Vec<f32>>> {
    load_rows(dir, &PARAM_FILES, 1)
}

/// Load the 8-row OCV/SoC table from `dir`.
pub fn load_ocv_rows(dir: &Path) -> eyre::Result<Vec<Vec<f32>>> {
    load_rows(dir, &OCV_FILES, 2)
}
