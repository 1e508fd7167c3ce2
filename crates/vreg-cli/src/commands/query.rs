//! Query command - ranked record search.

use crate::app::App;
use crate::commands::{describe, to_json};
use crate::OutputFormat;
use vreg_core::Config;

/// Run the query command.
pub fn run(config: Config, text: &str, limit: Option<usize>, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;

    if app.sync.record_count() == 0 {
        eprintln!("No records in {}. Add one with 'vreg add'.", app.data_file.display());
        return Ok(());
    }

    let mut results = app.controller.search_now(text)?;
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    let elapsed = app.controller.last_duration().unwrap_or_default();

    match output {
        OutputFormat::Text => {
            for hit in &results {
                println!("{:>5}  {}", hit.score, describe(&hit.record));
            }

            eprintln!();
            eprintln!(
                "Found {} results in {:.3}ms",
                results.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let json_results = results
                .iter()
                .map(|hit| to_json(&hit.record, Some(hit.score)))
                .collect::<anyhow::Result<Vec<_>>>()?;

            println!("{}", serde_json::to_string_pretty(&json_results)?);
        }
    }

    Ok(())
}
