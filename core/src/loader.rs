use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result, TableError};
use crate::models::{GlucoseReading, LoggedMeal, Nutrient, Participant, ParticipantId};

pub const SENSOR_INDEX_COLUMN: &str = "Index";
pub const SENSOR_TIMESTAMP_COLUMNS: [&str; 2] = ["Timestamp (YYYY-MM-DDThh:mm:ss)", "Timestamp"];
pub const SENSOR_GLUCOSE_COLUMNS: [&str; 2] = ["Glucose Value (mg/dL)", "Glucose"];

pub const MEAL_TIME_COLUMN: &str = "time_begin";
pub const MEAL_FOOD_COLUMN: &str = "logged_food";

/// Header cells produced when a food-log row was written without a header
/// line in front of it; the source row's values ended up as column names.
pub const MALFORMED_MEAL_COLUMNS: [&str; 11] = [
    "2020-02-22",
    "10:30:00",
    "2020-02-22 10:30:00",
    "Chicken Nuggets",
    "8.0",
    "piece",
    "Chicken Nuggets.1",
    "393.0",
    "19.0",
    "0.1",
    "20.0",
];

pub const DEMOGRAPHICS_ID_COLUMN: &str = "ID";
pub const DEMOGRAPHICS_GENDER_COLUMN: &str = "Gender";
pub const DEMOGRAPHICS_HBA1C_COLUMN: &str = "HbA1c";

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Coerce a cell to a timestamp. Unparseable input is `None`, never an error.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Coerce a cell to a finite number. `NaN`, `inf`, text and blanks are `None`.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Coerce a cell to a participant ID: `"007"`, `"7"` and `"7.0"` are all 7.
#[must_use]
pub fn parse_participant_id(raw: &str) -> Option<ParticipantId> {
    let s = raw.trim();
    if let Ok(id) = s.parse::<ParticipantId>() {
        return Some(id);
    }
    parse_number(s)
        .filter(|v| v.fract() == 0.0 && v.abs() < 9.0e15)
        .map(|v| v as ParticipantId)
}

/// Header lookup with dropped columns masked out. Matching is case-insensitive.
struct Columns {
    names: Vec<Option<String>>,
}

impl Columns {
    fn new(headers: &csv::StringRecord, dropped: &[&str]) -> Self {
        let names = headers
            .iter()
            .map(|h| {
                let h = h.trim();
                if dropped.iter().any(|d| d.eq_ignore_ascii_case(h)) {
                    None
                } else {
                    Some(h.to_string())
                }
            })
            .collect();
        Self { names }
    }

    fn dropped_count(&self) -> usize {
        self.names.iter().filter(|n| n.is_none()).count()
    }

    fn find(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|want| {
            self.names
                .iter()
                .position(|n| n.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(want)))
        })
    }

    fn require(&self, candidates: &[&str]) -> std::result::Result<usize, TableError> {
        self.find(candidates)
            .ok_or_else(|| TableError::MissingColumn(candidates[0].to_string()))
    }
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Parse a Dexcom CGM export.
///
/// The first `preamble_rows` records after the header are metadata and are
/// discarded. The `Index` column is ignored.
pub fn parse_sensor_csv<R: Read>(
    source: R,
    participant_id: ParticipantId,
    preamble_rows: usize,
) -> std::result::Result<Vec<GlucoseReading>, TableError> {
    let mut rdr = reader(source);
    let columns = Columns::new(rdr.headers()?, &[SENSOR_INDEX_COLUMN]);
    let idx_time = columns.require(&SENSOR_TIMESTAMP_COLUMNS)?;
    let idx_glucose = columns.require(&SENSOR_GLUCOSE_COLUMNS)?;

    let mut readings = Vec::new();
    for result in rdr.records().skip(preamble_rows) {
        let record = result?;
        readings.push(GlucoseReading {
            participant_id,
            timestamp: parse_timestamp(cell(&record, Some(idx_time))),
            glucose_mg_dl: parse_number(cell(&record, Some(idx_glucose))),
        });
    }
    Ok(readings)
}

/// Parse a food log. Amounts are read for each tracked nutrient in order; a
/// nutrient without a column yields `None` for every meal.
pub fn parse_meal_csv<R: Read>(
    source: R,
    participant_id: ParticipantId,
    nutrients: &[Nutrient],
) -> std::result::Result<Vec<LoggedMeal>, TableError> {
    let mut rdr = reader(source);
    let columns = Columns::new(rdr.headers()?, &MALFORMED_MEAL_COLUMNS);
    if columns.dropped_count() > 0 {
        debug!(
            participant_id,
            dropped = columns.dropped_count(),
            "dropped malformed food-log columns"
        );
    }
    let idx_time = columns.require(&[MEAL_TIME_COLUMN])?;
    let idx_food = columns.find(&[MEAL_FOOD_COLUMN]);
    let idx_nutrients: Vec<Option<usize>> = nutrients
        .iter()
        .map(|n| columns.find(&[n.name.as_str()]))
        .collect();

    let mut meals = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let food = cell(&record, idx_food);
        meals.push(LoggedMeal {
            participant_id,
            time_begin: parse_timestamp(cell(&record, Some(idx_time))),
            food_description: (!food.is_empty()).then(|| food.to_string()),
            nutrient_amounts: idx_nutrients
                .iter()
                .map(|idx| parse_number(cell(&record, *idx)))
                .collect(),
        });
    }
    Ok(meals)
}

/// Parse the shared demographics table. Rows whose ID cannot be coerced are
/// skipped; the first row wins when an ID repeats.
pub fn parse_demographics_csv<R: Read>(
    source: R,
) -> std::result::Result<Vec<Participant>, TableError> {
    let mut rdr = reader(source);
    let columns = Columns::new(rdr.headers()?, &[]);
    let idx_id = columns.require(&[DEMOGRAPHICS_ID_COLUMN])?;
    let idx_gender = columns.find(&[DEMOGRAPHICS_GENDER_COLUMN]);
    let idx_hba1c = columns.find(&[DEMOGRAPHICS_HBA1C_COLUMN]);

    let mut participants: Vec<Participant> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let Some(id) = parse_participant_id(cell(&record, Some(idx_id))) else {
            continue;
        };
        if participants.iter().any(|p| p.id == id) {
            continue;
        }
        let gender = cell(&record, idx_gender);
        participants.push(Participant {
            id,
            gender: (!gender.is_empty()).then(|| gender.to_string()),
            hba1c: parse_number(cell(&record, idx_hba1c)),
        });
    }
    Ok(participants)
}

fn open(path: &Path, participant: Option<ParticipantId>) -> Result<File> {
    File::open(path).map_err(|source| PipelineError::MissingInput {
        participant,
        path: path.to_path_buf(),
        source,
    })
}

fn malformed(path: &Path) -> impl FnOnce(TableError) -> PipelineError + '_ {
    move |source| PipelineError::MalformedInput {
        path: path.to_path_buf(),
        source,
    }
}

pub fn load_sensor_file(
    path: &Path,
    participant_id: ParticipantId,
    preamble_rows: usize,
) -> Result<Vec<GlucoseReading>> {
    let file = open(path, Some(participant_id))?;
    let readings =
        parse_sensor_csv(file, participant_id, preamble_rows).map_err(malformed(path))?;

    let coerced = readings
        .iter()
        .filter(|r| r.timestamp.is_none() || r.glucose_mg_dl.is_none())
        .count();
    if coerced > 0 {
        warn!(
            participant_id,
            coerced,
            path = %path.display(),
            "sensor rows with unparseable timestamp or glucose value"
        );
    }
    debug!(participant_id, readings = readings.len(), "loaded sensor file");
    Ok(readings)
}

pub fn load_meal_file(
    path: &Path,
    participant_id: ParticipantId,
    nutrients: &[Nutrient],
) -> Result<Vec<LoggedMeal>> {
    let file = open(path, Some(participant_id))?;
    let meals = parse_meal_csv(file, participant_id, nutrients).map_err(malformed(path))?;

    let untimed = meals.iter().filter(|m| m.time_begin.is_none()).count();
    if untimed > 0 {
        warn!(
            participant_id,
            untimed,
            path = %path.display(),
            "meals with unparseable time_begin will never match"
        );
    }
    debug!(participant_id, meals = meals.len(), "loaded food log");
    Ok(meals)
}

pub fn load_demographics_file(path: &Path) -> Result<Vec<Participant>> {
    let file = open(path, None)?;
    let participants = parse_demographics_csv(file).map_err(malformed(path))?;
    debug!(participants = participants.len(), "loaded demographics");
    Ok(participants)
}
