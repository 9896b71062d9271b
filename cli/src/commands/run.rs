use anyhow::{Context, Result};

use glucopeak_core::{Pipeline, PipelineConfig};

use super::helpers::print_records_table;

pub fn cmd_run(config: PipelineConfig, dry_run: bool, json: bool) -> Result<()> {
    let pipeline = Pipeline::new(config).context("Invalid configuration")?;

    if dry_run {
        let preview = pipeline.preview().context("Pipeline failed")?;
        let placeholders = preview.records.iter().filter(|r| r.is_placeholder()).count();

        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "policy": pipeline.config().output.policy,
                    "columns": preview.layout.headers,
                    "rows": preview.records.len(),
                    "placeholders": placeholders,
                    "records": preview.records,
                })
            );
            return Ok(());
        }

        print_records_table(&preview.layout, &preview.records);
        println!("\nDry run: nothing written.\n");
        println!("  Policy:        {}", pipeline.config().output.policy.as_str());
        println!("  Rows:          {}", preview.records.len());
        println!("  Placeholders:  {placeholders}");
        println!(
            "  Would write:   {}",
            pipeline.config().output.path.display()
        );
        return Ok(());
    }

    let summary = pipeline.run().context("Pipeline failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run complete.\n");
        println!("  Policy:         {}", summary.policy.as_str());
        println!("  Participants:   {}", summary.participants);
        println!(
            "  Meals matched:  {} of {}",
            summary.matched_meals, summary.meals
        );
        println!("  Rows written:   {}", summary.rows);
        println!("  Placeholders:   {}", summary.placeholders);
        println!("  Output:         {}", summary.output.display());
        println!("  SHA-256:        {}", summary.sha256);
    }

    Ok(())
}
