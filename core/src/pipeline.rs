use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::aggregate::{self, AggregationPolicy, OutputLayout};
use crate::config::{PipelineConfig, PolicyKind};
use crate::error::Result;
use crate::flags::flag_meals;
use crate::loader::{load_demographics_file, load_meal_file, load_sensor_file};
use crate::matcher::match_meals;
use crate::models::{Dataset, OutputRecord, ParticipantId, ParticipantStats};
use crate::writer::write_output;

/// Counts reported after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub policy: PolicyKind,
    pub participants: usize,
    pub rows: usize,
    pub placeholders: usize,
    pub meals: usize,
    pub matched_meals: usize,
    pub output: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

/// Output rows plus the layout they are written with, without touching disk.
#[derive(Debug, Clone)]
pub struct Preview {
    pub layout: OutputLayout,
    pub records: Vec<OutputRecord>,
    pub stats: Vec<ParticipantStats>,
}

/// Load → flag → match → aggregate → write, driven by one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    policy: Box<dyn AggregationPolicy>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let policy = aggregate::policy_for(&config.output);
        Ok(Self { config, policy })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn layout(&self) -> OutputLayout {
        self.policy.layout(&self.config.nutrients.tracked)
    }

    /// Read every input table for the active participants and flag meals.
    /// Excluded participants' files are never opened.
    pub fn load(&self) -> Result<Dataset> {
        let input = &self.config.input;
        let nutrients = &self.config.nutrients;

        let participants = load_demographics_file(&input.demographics_path())?;

        let mut readings = BTreeMap::new();
        let mut meals = BTreeMap::new();
        for id in input.active_participants() {
            let sensor = load_sensor_file(&input.sensor_path(id), id, input.sensor_preamble_rows)?;
            let logged = load_meal_file(&input.meal_path(id), id, &nutrients.tracked)?;
            readings.insert(id, sensor);
            meals.insert(id, flag_meals(logged, &nutrients.tracked, nutrients.threshold));
        }

        let dataset = Dataset {
            nutrients: nutrients.tracked.clone(),
            readings,
            meals,
            participants,
        };
        info!(
            participants = dataset.readings.len(),
            readings = dataset.readings.values().map(Vec::len).sum::<usize>(),
            meals = dataset.meals.values().map(Vec::len).sum::<usize>(),
            demographics = dataset.participants.len(),
            "loaded inputs"
        );
        Ok(dataset)
    }

    /// Participants in output order.
    #[must_use]
    pub fn participant_order(&self, dataset: &Dataset) -> Vec<ParticipantId> {
        aggregate::participant_order(
            dataset,
            &self.config.input.participants,
            &self.config.input.exclude,
        )
    }

    #[must_use]
    pub fn aggregate(&self, dataset: &Dataset) -> Vec<OutputRecord> {
        let order = self.participant_order(dataset);
        aggregate::aggregate(
            dataset,
            &order,
            self.policy.as_ref(),
            self.config.matching.window(),
        )
    }

    /// Coverage per configured participant, excluded ones included and flagged.
    #[must_use]
    pub fn participant_stats(&self, dataset: &Dataset) -> Vec<ParticipantStats> {
        let input = &self.config.input;
        let window = self.config.matching.window();

        let mut ids = self.participant_order(dataset);
        ids.extend(input.participants.iter().filter(|id| input.is_excluded(**id)));
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));

        ids.into_iter()
            .map(|id| {
                let meals = dataset.meals_for(id);
                ParticipantStats {
                    id,
                    readings: dataset.readings_for(id).len(),
                    meals: meals.len(),
                    matched_meals: match_meals(meals, dataset.readings_for(id), window).len(),
                    has_demographics: dataset.participant(id).is_some(),
                    excluded: input.is_excluded(id),
                }
            })
            .collect()
    }

    /// Everything except the write.
    pub fn preview(&self) -> Result<Preview> {
        let dataset = self.load()?;
        let records = self.aggregate(&dataset);
        let stats = self.participant_stats(&dataset);
        Ok(Preview {
            layout: self.layout(),
            records,
            stats,
        })
    }

    pub fn run(&self) -> Result<RunSummary> {
        let preview = self.preview()?;
        let receipt = write_output(&self.config.output.path, &preview.layout, &preview.records)?;

        let included = preview.stats.iter().filter(|s| !s.excluded);
        let summary = RunSummary {
            policy: self.policy.kind(),
            participants: included.clone().count(),
            rows: preview.records.len(),
            placeholders: preview.records.iter().filter(|r| r.is_placeholder()).count(),
            meals: included.clone().map(|s| s.meals).sum(),
            matched_meals: included.map(|s| s.matched_meals).sum(),
            output: receipt.path,
            bytes: receipt.bytes,
            sha256: receipt.sha256,
        };
        info!(
            policy = summary.policy.as_str(),
            rows = summary.rows,
            placeholders = summary.placeholders,
            "pipeline finished"
        );
        Ok(summary)
    }
}
