//! Update command - patch a record.

use crate::app::App;
use crate::commands::describe;
use vreg_core::{Config, RecordId, RecordPatch};

/// Run the update command.
pub fn run(config: Config, id: &str, patch: RecordPatch) -> anyhow::Result<()> {
    if patch.is_empty() {
        eprintln!("Nothing to update. Pass at least one field, e.g. --status approved.");
        return Ok(());
    }

    let app = App::new(config)?;
    let updated = app.sync.update(&RecordId::new(id), patch)?;
    println!("Updated {}", describe(&updated));

    Ok(())
}
