//! Watch command - refresh periodically and report mirror changes.

use crate::app::App;
use tracing::{info, warn};
use vreg_core::{Config, SearchEvent};

/// Run the watch command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let mut config = config;
    // Watching without the timer would never report anything
    config.sync.auto_refresh = true;
    if config.sync.refresh_interval_secs == 0 {
        config.sync.refresh_interval_secs = 30;
    }

    let app = App::new(config)?;
    let events = app.controller.events();

    app.sync.start()?;

    println!(
        "Watching {} ({} records, refresh every {}s)",
        app.data_file.display(),
        app.sync.record_count(),
        app.config.sync.refresh_interval_secs
    );
    println!("Press Ctrl+C to stop.");
    println!();

    let mut failing: Option<String> = None;
    loop {
        match events.recv_timeout(app.config.sync.refresh_interval()) {
            Ok(SearchEvent::IndexRebuilt { records }) => {
                info!(records, "Records changed");
                println!("Records changed: {} records", records);
            }
            Ok(SearchEvent::SyncFailed { reason }) => {
                if failing.as_deref() != Some(reason.as_str()) {
                    warn!(error = %reason, "Refresh failing");
                    println!("Refresh failed: {}", reason);
                }
                failing = Some(reason);
                continue;
            }
            Ok(_) => {}
            Err(e) if e.is_timeout() => {}
            Err(_) => break,
        }

        // Successful refreshes that change nothing emit no event
        if failing.is_some() && app.sync.last_error().is_none() {
            info!("Refresh recovered");
            println!("Refresh recovered");
            failing = None;
        }
    }

    app.sync.stop();
    println!("Watching stopped.");
    Ok(())
}
