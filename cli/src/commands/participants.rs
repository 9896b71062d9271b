use anyhow::{Context, Result};
use tabled::Tabled;

use glucopeak_core::{Pipeline, PipelineConfig};

use super::helpers::print_table;

pub fn cmd_participants(config: PipelineConfig, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct CoverageRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Readings")]
        readings: usize,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Matched")]
        matched: usize,
        #[tabled(rename = "Demographics")]
        demographics: &'static str,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let dataset = pipeline.load().context("Failed to load inputs")?;
    let stats = pipeline.participant_stats(&dataset);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let rows: Vec<CoverageRow> = stats
        .iter()
        .map(|s| CoverageRow {
            id: s.id,
            readings: s.readings,
            meals: s.meals,
            matched: s.matched_meals,
            demographics: if s.has_demographics { "yes" } else { "missing" },
            status: if s.excluded {
                "excluded"
            } else if s.matched_meals == 0 {
                "placeholder"
            } else {
                "ok"
            },
        })
        .collect();

    print_table(&rows);
    Ok(())
}
