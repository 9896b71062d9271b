use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type ParticipantId = i64;

/// A tracked nutrient: the meal-log column it is read from, the label used by
/// the per-nutrient output, and its recommended daily value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub name: String,
    pub label: String,
    pub daily_value: f64,
}

impl Nutrient {
    #[must_use]
    pub fn new(name: &str, label: &str, daily_value: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            daily_value,
        }
    }

    /// Name of the boolean output column, e.g. `total_carb_present`.
    #[must_use]
    pub fn flag_column(&self) -> String {
        format!("{}_present", self.name)
    }
}

/// The five macronutrients tracked by default, with FDA daily values.
#[must_use]
pub fn default_nutrients() -> Vec<Nutrient> {
    vec![
        Nutrient::new("total_carb", "Carbs", 275.0),
        Nutrient::new("protein", "Protein", 50.0),
        Nutrient::new("sugar", "Sugar", 50.0),
        Nutrient::new("total_fat", "Fat", 78.0),
        Nutrient::new("dietary_fiber", "Fiber", 28.0),
    ]
}

/// One CGM sample. Unparseable cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlucoseReading {
    pub participant_id: ParticipantId,
    pub timestamp: Option<NaiveDateTime>,
    pub glucose_mg_dl: Option<f64>,
}

/// A meal-log row as read from disk, before nutrient flags are computed.
///
/// `nutrient_amounts` is aligned with the tracked nutrient list it was loaded with.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMeal {
    pub participant_id: ParticipantId,
    pub time_begin: Option<NaiveDateTime>,
    pub food_description: Option<String>,
    pub nutrient_amounts: Vec<Option<f64>>,
}

/// A meal with its nutrient presence flags, aligned with the tracked nutrient list.
#[derive(Debug, Clone, PartialEq)]
pub struct MealEvent {
    pub participant_id: ParticipantId,
    pub time_begin: Option<NaiveDateTime>,
    pub food_description: Option<String>,
    pub nutrient_amounts: Vec<Option<f64>>,
    pub nutrient_present: Vec<bool>,
}

/// A demographics row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub gender: Option<String>,
    #[serde(rename = "HbA1C")]
    pub hba1c: Option<f64>,
}

/// A meal together with the highest glucose reading in its post-meal window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPeak<'a> {
    pub meal: &'a MealEvent,
    pub peak_glucose: f64,
}

/// A row of the output table. Which fields are written depends on the
/// aggregation policy's layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "ID")]
    pub id: ParticipantId,
    #[serde(rename = "Avg_Peak_Glucose")]
    pub avg_peak_glucose: Option<f64>,
    #[serde(rename = "Meal_Count")]
    pub meal_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nutrient_present: Vec<bool>,
    #[serde(rename = "Nutrient", skip_serializing_if = "Option::is_none")]
    pub nutrient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_food: Option<String>,
    pub gender: Option<String>,
    #[serde(rename = "HbA1C")]
    pub hba1c: Option<f64>,
}

impl OutputRecord {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.meal_count == 0
    }
}

/// The three source tables after loading and flagging. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub nutrients: Vec<Nutrient>,
    pub readings: BTreeMap<ParticipantId, Vec<GlucoseReading>>,
    pub meals: BTreeMap<ParticipantId, Vec<MealEvent>>,
    /// Demographics in file order, one row per distinct ID.
    pub participants: Vec<Participant>,
}

impl Dataset {
    #[must_use]
    pub fn readings_for(&self, id: ParticipantId) -> &[GlucoseReading] {
        self.readings.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn meals_for(&self, id: ParticipantId) -> &[MealEvent] {
        self.meals.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }
}

/// Per-participant coverage counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantStats {
    pub id: ParticipantId,
    pub readings: usize,
    pub meals: usize,
    pub matched_meals: usize,
    pub has_demographics: bool,
    pub excluded: bool,
}
