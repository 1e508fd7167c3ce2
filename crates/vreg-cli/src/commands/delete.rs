//! Delete command - remove a record.

use crate::app::App;
use vreg_core::{Config, RecordId};

/// Run the delete command.
pub fn run(config: Config, id: &str) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = RecordId::new(id);

    if app.sync.mirror().get(&id).is_none() {
        eprintln!("No record with id {}.", id);
        return Ok(());
    }

    app.sync.delete(&id)?;
    println!("Deleted {} ({} records left)", id, app.sync.record_count());

    Ok(())
}
