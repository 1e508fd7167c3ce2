//! Status command - show record and index statistics.

use crate::app::App;
use std::sync::atomic::Ordering;
use vreg_core::{ApprovalStatus, Config};

/// Run the status command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let mirror = app.sync.mirror();

    println!("Vreg Status");
    println!("===========");
    println!();

    if mirror.is_empty() {
        println!("No records yet. Run 'vreg add' to register a vehicle.");
        println!();
        println!("Record file: {}", app.data_file.display());
        return Ok(());
    }

    let count = |status: ApprovalStatus| {
        mirror
            .records()
            .iter()
            .filter(|r| r.approval_status == status)
            .count()
    };

    println!("Records:");
    println!("  Total:     {}", mirror.len());
    println!("  Approved:  {}", count(ApprovalStatus::Approved));
    println!("  Pending:   {}", count(ApprovalStatus::Pending));
    println!("  Rejected:  {}", count(ApprovalStatus::Rejected));

    if let Some(refreshed) = app.sync.last_refreshed_at() {
        println!(
            "  Refreshed: {}",
            refreshed.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let index = app.controller.index();
    let stats = index.stats();
    println!();
    println!("Index:");
    println!("  Records:        {}", stats.record_count);
    println!("  Trie nodes:     {}", stats.node_count);
    println!("  Skipped fields: {}", stats.skipped_fields);
    println!(
        "  Build time:     {:.3}ms",
        stats.build_time.as_secs_f64() * 1000.0
    );

    let cache = app.controller.cache_stats();
    println!();
    println!("Result cache:");
    println!("  Capacity: {}", app.config.cache.capacity);
    println!("  Max age:  {}s", app.config.cache.max_age_secs);
    println!("  Hits:     {}", cache.hits.load(Ordering::Relaxed));
    println!("  Misses:   {}", cache.misses.load(Ordering::Relaxed));

    println!();
    println!("Record file: {}", app.data_file.display());

    Ok(())
}
