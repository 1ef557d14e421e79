//! Population files.
//!
//! CSV files hold one fiber per row, `diameter,type,y,z[,node_shift]`, with
//! the type coded 1 (myelinated) or 0 (unmyelinated) and `NaN` for unset
//! values. Lines starting with `#` are comments. Files ending in `.json`
//! hold a serialized [`PopulationData`].

use crate::error::{PackingError, Result};
use crate::population::{FiberType, PopulationData};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn save_population(path: &Path, data: &PopulationData, comment: Option<&str>) -> Result<()> {
    if is_json(path) {
        let mut out = BufWriter::new(File::create(path).map_err(|e| PackingError::io(path, e))?);
        serde_json::to_writer_pretty(&mut out, data)?;
        out.flush().map_err(|e| PackingError::io(path, e))?;
    } else {
        save_population_csv(path, data, comment)?;
    }
    info!("Population of {} fibers saved to {}", data.diameters.len(), path.display());
    Ok(())
}

pub fn load_population(path: &Path) -> Result<PopulationData> {
    if is_json(path) {
        let file = File::open(path).map_err(|e| PackingError::io(path, e))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    } else {
        load_population_csv(path)
    }
}

fn save_population_csv(path: &Path, data: &PopulationData, comment: Option<&str>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).map_err(|e| PackingError::io(path, e))?);
    if let Some(comment) = comment {
        for line in comment.lines() {
            writeln!(out, "# {line}").map_err(|e| PackingError::io(path, e))?;
        }
    }

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    let value = |col: &Option<Vec<f64>>, i: usize| col.as_ref().map_or(f64::NAN, |c| c[i]);
    for (i, (&d, t)) in data.diameters.iter().zip(&data.types).enumerate() {
        let mut row = vec![d.to_string(), t.code().to_string(), value(&data.y, i).to_string(), value(&data.z, i).to_string()];
        if data.node_shift.is_some() {
            row.push(value(&data.node_shift, i).to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush().map_err(|e| PackingError::io(path, e))?;
    Ok(())
}

fn load_population_csv(path: &Path) -> Result<PopulationData> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut data = PopulationData::default();
    let (mut y, mut z, mut shift) = (Vec::new(), Vec::new(), Vec::new());
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| -> Result<f64> {
            match record.get(i) {
                None | Some("") => Ok(f64::NAN),
                Some(s) => s
                    .parse::<f64>()
                    .map_err(|e| PackingError::config(format!("{} row {}, column {}: {}", path.display(), row + 1, i, e))),
            }
        };
        data.diameters.push(field(0)?);
        let code = field(1)?;
        data.types.push(
            FiberType::from_code(code)
                .ok_or_else(|| PackingError::config(format!("{} row {}: unknown fiber type {}", path.display(), row + 1, code)))?,
        );
        y.push(field(2)?);
        z.push(field(3)?);
        shift.push(field(4)?);
    }

    let any_finite = |v: &[f64]| v.iter().any(|x| x.is_finite());
    if any_finite(&y) || any_finite(&z) {
        data.y = Some(y);
        data.z = Some(z);
    }
    if any_finite(&shift) {
        data.node_shift = Some(shift);
    }
    Ok(data)
}
