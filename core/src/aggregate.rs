use chrono::Duration;
use tracing::debug;

use crate::config::{OutputConfig, PolicyKind};
use crate::matcher::match_meals;
use crate::models::{Dataset, MatchedPeak, Nutrient, OutputRecord, Participant, ParticipantId};

/// One column of the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    AvgPeakGlucose,
    MealCount,
    /// Presence flag of the tracked nutrient at this index.
    NutrientPresent(usize),
    Nutrient,
    LoggedFood,
    Gender,
    HbA1c,
}

/// Ordered columns and their header names.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    pub columns: Vec<Column>,
    pub headers: Vec<String>,
}

impl OutputLayout {
    #[must_use]
    pub fn new(columns: Vec<Column>, nutrients: &[Nutrient]) -> Self {
        let headers = columns
            .iter()
            .map(|c| match c {
                Column::Id => "ID".to_string(),
                Column::AvgPeakGlucose => "Avg_Peak_Glucose".to_string(),
                Column::MealCount => "Meal_Count".to_string(),
                Column::NutrientPresent(i) => nutrients
                    .get(*i)
                    .map_or_else(|| format!("nutrient_{i}_present"), Nutrient::flag_column),
                Column::Nutrient => "Nutrient".to_string(),
                Column::LoggedFood => "logged_food".to_string(),
                Column::Gender => "gender".to_string(),
                Column::HbA1c => "HbA1C".to_string(),
            })
            .collect();
        Self { columns, headers }
    }
}

/// A participant as seen by a policy: its ID and demographics, if any.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantRef<'a> {
    pub id: ParticipantId,
    pub demographics: Option<&'a Participant>,
}

impl ParticipantRef<'_> {
    /// A bare row for this participant with demographics filled in.
    #[must_use]
    pub fn record(&self, avg_peak_glucose: Option<f64>, meal_count: usize) -> OutputRecord {
        OutputRecord {
            id: self.id,
            avg_peak_glucose,
            meal_count,
            nutrient_present: Vec::new(),
            nutrient: None,
            logged_food: None,
            gender: self.demographics.and_then(|d| d.gender.clone()),
            hba1c: self.demographics.and_then(|d| d.hba1c),
        }
    }

    /// The row emitted when nothing matched: no peak, zero meals, no flags set.
    #[must_use]
    pub fn placeholder(&self, nutrient_count: usize) -> OutputRecord {
        OutputRecord {
            nutrient_present: vec![false; nutrient_count],
            ..self.record(None, 0)
        }
    }
}

/// Turns a participant's matched peaks into output rows and declares the
/// columns they are written with.
pub trait AggregationPolicy {
    fn kind(&self) -> PolicyKind;

    fn layout(&self, nutrients: &[Nutrient]) -> OutputLayout;

    /// Rows for a participant with at least one matched peak.
    fn emit(
        &self,
        participant: ParticipantRef<'_>,
        matched: &[MatchedPeak<'_>],
        nutrients: &[Nutrient],
    ) -> Vec<OutputRecord>;
}

/// One row per matched meal, optionally ranked by peak and truncated to `top_k`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerMeal {
    pub top_k: Option<usize>,
    pub include_food: bool,
}

impl AggregationPolicy for PerMeal {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PerMeal
    }

    fn layout(&self, nutrients: &[Nutrient]) -> OutputLayout {
        let mut columns = vec![Column::Id, Column::AvgPeakGlucose, Column::MealCount];
        columns.extend((0..nutrients.len()).map(Column::NutrientPresent));
        if self.include_food {
            columns.push(Column::LoggedFood);
        }
        columns.extend([Column::Gender, Column::HbA1c]);
        OutputLayout::new(columns, nutrients)
    }

    fn emit(
        &self,
        participant: ParticipantRef<'_>,
        matched: &[MatchedPeak<'_>],
        nutrients: &[Nutrient],
    ) -> Vec<OutputRecord> {
        let mut selected: Vec<&MatchedPeak<'_>> = matched.iter().collect();
        if let Some(k) = self.top_k {
            // sort_by is stable: equal peaks keep meal-log order
            selected.sort_by(|a, b| b.peak_glucose.total_cmp(&a.peak_glucose));
            selected.truncate(k);
        }

        selected
            .into_iter()
            .map(|m| {
                let mut flags = m.meal.nutrient_present.clone();
                flags.resize(nutrients.len(), false);
                OutputRecord {
                    nutrient_present: flags,
                    logged_food: if self.include_food {
                        m.meal.food_description.clone()
                    } else {
                        None
                    },
                    ..participant.record(Some(m.peak_glucose), 1)
                }
            })
            .collect()
    }
}

/// One row per (participant, nutrient) holding the mean peak over meals where
/// that nutrient is present. Nutrients with no such meal produce no row.
/// When no nutrient qualifies the participant falls back to a placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerNutrient;

impl AggregationPolicy for PerNutrient {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PerNutrient
    }

    fn layout(&self, nutrients: &[Nutrient]) -> OutputLayout {
        OutputLayout::new(
            vec![
                Column::Id,
                Column::AvgPeakGlucose,
                Column::MealCount,
                Column::Nutrient,
                Column::Gender,
                Column::HbA1c,
            ],
            nutrients,
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn emit(
        &self,
        participant: ParticipantRef<'_>,
        matched: &[MatchedPeak<'_>],
        nutrients: &[Nutrient],
    ) -> Vec<OutputRecord> {
        nutrients
            .iter()
            .enumerate()
            .filter_map(|(i, nutrient)| {
                let peaks: Vec<f64> = matched
                    .iter()
                    .filter(|m| m.meal.nutrient_present.get(i).copied().unwrap_or(false))
                    .map(|m| m.peak_glucose)
                    .collect();
                if peaks.is_empty() {
                    return None;
                }
                let mean = peaks.iter().sum::<f64>() / peaks.len() as f64;
                Some(OutputRecord {
                    nutrient: Some(nutrient.label.clone()),
                    ..participant.record(Some(mean), peaks.len())
                })
            })
            .collect()
    }
}

/// Build the policy selected by the output configuration.
#[must_use]
pub fn policy_for(output: &OutputConfig) -> Box<dyn AggregationPolicy> {
    match output.policy {
        PolicyKind::PerMeal => Box::new(PerMeal {
            top_k: output.top_k,
            include_food: output.include_food,
        }),
        PolicyKind::PerNutrient => Box::new(PerNutrient),
    }
}

/// Order in which participants appear in the output.
///
/// Configured participants found in demographics come first, in demographics
/// order; the rest follow in configured order. Excluded IDs never appear.
#[must_use]
pub fn participant_order(
    dataset: &Dataset,
    configured: &[ParticipantId],
    exclude: &[ParticipantId],
) -> Vec<ParticipantId> {
    let wanted = |id: &ParticipantId| configured.contains(id) && !exclude.contains(id);

    let mut order: Vec<ParticipantId> = dataset
        .participants
        .iter()
        .map(|p| p.id)
        .filter(wanted)
        .collect();
    for id in configured.iter().filter(|id| wanted(id)) {
        if !order.contains(id) {
            order.push(*id);
        }
    }
    order
}

/// Apply `policy` to every participant in `order`. A participant without any
/// matched meal, or one for whom the policy emits nothing, gets exactly one
/// placeholder row.
#[must_use]
pub fn aggregate(
    dataset: &Dataset,
    order: &[ParticipantId],
    policy: &dyn AggregationPolicy,
    window: Duration,
) -> Vec<OutputRecord> {
    let nutrients = &dataset.nutrients;
    let mut records = Vec::new();

    for &id in order {
        let participant = ParticipantRef {
            id,
            demographics: dataset.participant(id),
        };
        let matched = match_meals(dataset.meals_for(id), dataset.readings_for(id), window);
        debug!(
            participant_id = id,
            meals = dataset.meals_for(id).len(),
            matched = matched.len(),
            "matched meals"
        );

        let emitted = if matched.is_empty() {
            Vec::new()
        } else {
            policy.emit(participant, &matched, nutrients)
        };
        // every participant keeps at least one row
        if emitted.is_empty() {
            records.push(participant.placeholder(nutrients.len()));
        } else {
            records.extend(emitted);
        }
    }
    records
}
