use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tabled::{
    Table,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glucopeak_core::PipelineConfig;
use glucopeak_core::aggregate::{Column, OutputLayout};
use glucopeak_core::config::{DEFAULT_TOP_K, PolicyKind};
use glucopeak_core::models::OutputRecord;
use glucopeak_core::writer::render_row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum PolicyArg {
    /// One row per matched meal
    PerMeal,
    /// One row per participant and nutrient with the mean peak
    PerNutrient,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PerMeal => PolicyKind::PerMeal,
            PolicyArg::PerNutrient => PolicyKind::PerNutrient,
        }
    }
}

/// Command-line overrides for values in the config file.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct Overrides {
    /// Directory containing the Dexcom, food-log and demographics files
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
    /// Output CSV path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Aggregation policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
    /// Rank per-meal rows by peak and keep the top K (default K: 20)
    #[arg(long, value_name = "K", num_args = 0..=1)]
    pub rank: Option<Option<usize>>,
    /// Add the logged_food column (per-meal policy)
    #[arg(long)]
    pub include_food: bool,
    /// Participant IDs to process (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub participants: Vec<i64>,
    /// Participant IDs to skip entirely (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub exclude: Vec<i64>,
}

impl Overrides {
    /// CLI values take precedence; unset flags leave the file value alone.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.input.data_dir.clone_from(dir);
        }
        if let Some(path) = &self.output {
            config.output.path.clone_from(path);
        }
        if let Some(policy) = self.policy {
            config.output.policy = policy.into();
        }
        if let Some(k) = self.rank {
            config.output.top_k = Some(k.unwrap_or(DEFAULT_TOP_K));
        }
        if self.include_food {
            config.output.include_food = true;
        }
        if !self.participants.is_empty() {
            config.input.participants.clone_from(&self.participants);
        }
        if !self.exclude.is_empty() {
            config.input.exclude.clone_from(&self.exclude);
        }
    }
}

pub(crate) fn print_records_table(layout: &OutputLayout, records: &[OutputRecord]) {
    let mut builder = Builder::default();
    builder.push_record(layout.headers.iter().map(|h| short_header(h)));
    for record in records {
        let mut cells = render_row(layout, record);
        for (cell, column) in cells.iter_mut().zip(&layout.columns) {
            if *column == Column::LoggedFood {
                *cell = truncate(cell, 30);
            }
        }
        builder.push_record(cells);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// `total_carb_present` -> `total_carb?` keeps wide layouts readable.
fn short_header(header: &str) -> String {
    header
        .strip_suffix("_present")
        .map_or_else(|| header.to_string(), |n| format!("{n}?"))
}

pub(crate) fn print_table<T: tabled::Tabled>(rows: &[T]) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
