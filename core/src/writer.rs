use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;

use crate::aggregate::{Column, OutputLayout};
use crate::error::{PipelineError, Result};
use crate::models::OutputRecord;

/// Where the table went and what it hashed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

/// Floats always carry a decimal point so integral peaks read as `165.0`.
#[must_use]
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

fn format_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn cell(record: &OutputRecord, column: Column) -> String {
    match column {
        Column::Id => record.id.to_string(),
        Column::AvgPeakGlucose => record.avg_peak_glucose.map(format_float).unwrap_or_default(),
        Column::MealCount => record.meal_count.to_string(),
        Column::NutrientPresent(i) => {
            format_bool(record.nutrient_present.get(i).copied().unwrap_or(false)).to_string()
        }
        Column::Nutrient => record.nutrient.clone().unwrap_or_default(),
        Column::LoggedFood => record.logged_food.clone().unwrap_or_default(),
        Column::Gender => record.gender.clone().unwrap_or_default(),
        Column::HbA1c => record.hba1c.map(format_float).unwrap_or_default(),
    }
}

/// The cells of one record in layout order, formatted as they are written.
#[must_use]
pub fn render_row(layout: &OutputLayout, record: &OutputRecord) -> Vec<String> {
    layout.columns.iter().map(|c| cell(record, *c)).collect()
}

/// Serialize `records` as CSV into any writer, header first.
pub fn write_csv<W: Write>(
    writer: W,
    layout: &OutputLayout,
    records: &[OutputRecord],
) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&layout.headers)?;
    for record in records {
        wtr.write_record(render_row(layout, record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize to an in-memory buffer.
pub fn render_csv(
    layout: &OutputLayout,
    records: &[OutputRecord],
) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_csv(&mut buf, layout, records)?;
    Ok(buf)
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Write the table to `path` atomically: the bytes go to a temporary file in
/// the same directory, which then replaces `path`. On failure nothing is left
/// at `path` that was not there before.
pub fn write_output(
    path: &Path,
    layout: &OutputLayout,
    records: &[OutputRecord],
) -> Result<WriteReceipt> {
    let write_err = |source: std::io::Error| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let bytes = render_csv(layout, records).map_err(|e| write_err(e.into()))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    let receipt = WriteReceipt {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        sha256: sha256_hex(&bytes),
    };
    info!(
        path = %receipt.path.display(),
        rows = records.len(),
        bytes = receipt.bytes,
        "wrote output"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationPolicy, PerMeal, PerNutrient};
    use crate::models::default_nutrients;

    fn row(id: i64, peak: Option<f64>, count: usize) -> OutputRecord {
        OutputRecord {
            id,
            avg_peak_glucose: peak,
            meal_count: count,
            nutrient_present: vec![true, false, true, false, false],
            nutrient: None,
            logged_food: None,
            gender: Some("FEMALE".to_string()),
            hba1c: Some(5.5),
        }
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(165.0), "165.0");
        assert_eq!(format_float(182.5), "182.5");
        assert_eq!(format_float(5.4), "5.4");
    }

    #[test]
    fn test_per_meal_csv() {
        let layout = PerMeal::default().layout(&default_nutrients());
        let mut placeholder = row(2, None, 0);
        placeholder.nutrient_present = vec![false; 5];
        placeholder.gender = None;
        placeholder.hba1c = None;

        let out = render_csv(&layout, &[row(1, Some(165.0), 1), placeholder]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "ID,Avg_Peak_Glucose,Meal_Count,total_carb_present,protein_present,sugar_present,total_fat_present,dietary_fiber_present,gender,HbA1C"
        );
        assert_eq!(lines[1], "1,165.0,1,True,False,True,False,False,FEMALE,5.5");
        assert_eq!(lines[2], "2,,0,False,False,False,False,False,,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_per_nutrient_csv() {
        let layout = PerNutrient.layout(&default_nutrients());
        let mut r = row(3, Some(182.5), 2);
        r.nutrient = Some("Carbs".to_string());
        let text = String::from_utf8(render_csv(&layout, &[r]).unwrap()).unwrap();
        assert_eq!(
            text,
            "ID,Avg_Peak_Glucose,Meal_Count,Nutrient,gender,HbA1C\n3,182.5,2,Carbs,FEMALE,5.5\n"
        );
    }

    #[test]
    fn test_food_with_comma_is_quoted() {
        let layout = PerMeal {
            top_k: None,
            include_food: true,
        }
        .layout(&default_nutrients());
        let mut r = row(1, Some(120.0), 1);
        r.logged_food = Some("Rice, white".to_string());
        let text = String::from_utf8(render_csv(&layout, &[r]).unwrap()).unwrap();
        assert!(text.contains("\"Rice, white\""));
    }

    #[test]
    fn test_sha256_hex() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_write_output_replaces_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.csv");
        std::fs::write(&path, "stale").unwrap();

        let layout = PerNutrient.layout(&default_nutrients());
        let receipt = write_output(&path, &layout, &[]).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"ID,Avg_Peak_Glucose,Meal_Count,Nutrient,gender,HbA1C\n");
        assert_eq!(receipt.bytes, written.len());
        assert_eq!(receipt.sha256, sha256_hex(&written));
        // no temp files left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_output_missing_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing").join("out.csv");
        let layout = PerNutrient.layout(&default_nutrients());
        let err = write_output(&path, &layout, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Write { .. }));
        assert!(!path.exists());
    }
}
