//! Add command - create a record.

use crate::app::App;
use crate::commands::{describe, to_json};
use crate::OutputFormat;
use chrono::{Local, NaiveDate};
use clap::Args;
use vreg_core::{Config, NewVehicleRecord};

/// Fields of a new record
#[derive(Args, Debug)]
pub struct AddArgs {
    /// License plate, e.g. ABC-4567
    #[arg(long)]
    pub plate: String,

    /// Applicant name
    #[arg(long)]
    pub applicant: String,

    /// Contact phone number
    #[arg(long)]
    pub phone: String,

    #[arg(long, default_value = "car")]
    pub vehicle_type: String,

    #[arg(long, default_value = "staff")]
    pub identity_type: String,

    #[arg(long)]
    pub department: Option<String>,

    #[arg(long)]
    pub brand: Option<String>,

    #[arg(long)]
    pub color: Option<String>,

    /// Application date (YYYY-MM-DD, default today)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl AddArgs {
    fn into_record(self) -> NewVehicleRecord {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let mut record = NewVehicleRecord::new(
            self.plate,
            self.applicant,
            self.vehicle_type,
            self.identity_type,
            self.phone,
            date,
        );
        record.department = self.department;
        record.brand = self.brand;
        record.color = self.color;
        record
    }
}

/// Run the add command.
pub fn run(config: Config, args: AddArgs, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let created = app.sync.add(args.into_record())?;

    match output {
        OutputFormat::Text => {
            println!("Created {}", describe(&created));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&to_json(&created, None)?)?);
        }
    }

    Ok(())
}
