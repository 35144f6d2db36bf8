use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use ulid::Ulid;

use slotwise::clock::SystemClock;
use slotwise::compactor::compact_if_needed;
use slotwise::config::Config;
use slotwise::engine::Engine;
use slotwise::model::NewBooking;
use slotwise::notify::NotifyHub;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Office scheduling and availability engine
#[derive(Parser, Debug)]
#[command(name = "slotwise")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Manage offices
    #[command(subcommand)]
    Office(OfficeCommand),
    /// Manage an office's working plan
    #[command(subcommand)]
    Plan(PlanCommand),
    /// Bookable slots of one day
    Slots {
        #[arg(value_parser = id)]
        office: Ulid,
        /// Day as YYYY-MM-DD
        #[arg(value_parser = date)]
        date: NaiveDate,
    },
    /// Slots of one day annotated with availability
    Availability {
        #[arg(value_parser = id)]
        office: Ulid,
        /// Day as YYYY-MM-DD
        #[arg(value_parser = date)]
        date: NaiveDate,
        /// Restrict to one provider's bookings
        #[arg(value_parser = id)]
        provider: Option<Ulid>,
    },
    /// Place a booking
    Book {
        #[arg(value_parser = id)]
        office: Ulid,
        #[arg(value_parser = id)]
        provider: Ulid,
        #[arg(value_parser = id)]
        customer: Ulid,
        /// Local start time, YYYY-MM-DDTHH:MM
        #[arg(value_parser = timestamp)]
        start: NaiveDateTime,
        /// Local end time, YYYY-MM-DDTHH:MM
        #[arg(value_parser = timestamp)]
        end: NaiveDateTime,
    },
    /// Cancel a booking
    Cancel {
        #[arg(value_parser = id)]
        booking: Ulid,
    },
    /// Rewrite the WAL down to the current state
    Compact,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum OfficeCommand {
    /// Create an office with the default working plan
    Create {
        /// Office name (may contain spaces)
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// List all offices
    List,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum PlanCommand {
    /// Replace the plan from a JSON file (either break shape)
    Set {
        #[arg(value_parser = id)]
        office: Ulid,
        file: PathBuf,
    },
    /// Print the stored plan
    Show {
        #[arg(value_parser = id)]
        office: Ulid,
    },
}

fn id(raw: &str) -> Result<Ulid, String> {
    raw.parse().map_err(|_| format!("not an id: {raw}"))
}

fn date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("not a date (YYYY-MM-DD): {raw}"))
}

fn timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("not a local time (YYYY-MM-DDTHH:MM): {raw}"))
}

impl Command {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Office(OfficeCommand::Create { .. })
                | Command::Plan(PlanCommand::Set { .. })
                | Command::Book { .. }
                | Command::Cancel { .. }
        )
    }
}

async fn execute(engine: &Engine, command: Command) -> CliResult<Value> {
    let out = match command {
        Command::Office(OfficeCommand::Create { name }) => {
            serde_json::to_value(engine.create_office(Ulid::new(), name.join(" ")).await?)?
        }
        Command::Office(OfficeCommand::List) => serde_json::to_value(engine.list_offices().await)?,
        Command::Plan(PlanCommand::Set { office, file }) => {
            let raw: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            serde_json::to_value(engine.configure_working_plan(office, &raw).await?.working_plan)?
        }
        Command::Plan(PlanCommand::Show { office }) => {
            let office = engine
                .get_office(office)
                .await
                .ok_or_else(|| format!("office not found: {office}"))?;
            serde_json::to_value(office.working_plan)?
        }
        Command::Slots { office, date } => serde_json::to_value(engine.generate_slots(office, date).await?)?,
        Command::Availability { office, date, provider } => {
            serde_json::to_value(engine.compute_availability(office, date, provider).await?)?
        }
        Command::Book { office, provider, customer, start, end } => {
            let candidate = NewBooking::new(office, provider, customer, start, end, engine.now());
            serde_json::to_value(engine.place_booking(candidate).await?)?
        }
        Command::Cancel { booking } => serde_json::to_value(engine.cancel_booking(booking).await?)?,
        Command::Compact => {
            engine.compact_wal().await?;
            serde_json::json!({ "compacted": true })
        }
    };
    Ok(out)
}

async fn run(command: Command) -> CliResult<Value> {
    let config = Config::from_env();
    slotwise::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let clock = Arc::new(SystemClock::with_offset_minutes(config.utc_offset_minutes));
    let engine = Engine::new(config.wal_path(), Arc::new(NotifyHub::new()), clock)?;
    info!("data_dir: {}", config.data_dir.display());

    let mutates = command.mutates();
    let out = execute(&engine, command).await?;
    if mutates {
        compact_if_needed(&engine, config.compact_threshold).await?;
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run(cli.command).await {
        Ok(out) => {
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_else(|_| out.to_string()));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        let args = std::iter::once("slotwise").chain(line.split_whitespace());
        Cli::try_parse_from(args).map(|cli| cli.command)
    }

    #[test]
    fn office_names_may_contain_spaces() {
        assert_eq!(
            parse("office create North Wing").unwrap(),
            Command::Office(OfficeCommand::Create {
                name: vec!["North".into(), "Wing".into()]
            })
        );
        assert!(parse("office create").is_err());
    }

    #[test]
    fn availability_provider_is_optional() {
        let office = Ulid::new();
        let provider = Ulid::new();
        let day = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();

        assert_eq!(
            parse(&format!("availability {office} 2030-01-07")).unwrap(),
            Command::Availability { office, date: day, provider: None }
        );
        assert_eq!(
            parse(&format!("availability {office} 2030-01-07 {provider}")).unwrap(),
            Command::Availability { office, date: day, provider: Some(provider) }
        );
    }

    #[test]
    fn book_accepts_minute_precision() {
        let (o, p, c) = (Ulid::new(), Ulid::new(), Ulid::new());
        let cmd = parse(&format!("book {o} {p} {c} 2030-01-07T10:00 2030-01-07T10:30:00")).unwrap();
        let Command::Book { start, end, .. } = cmd else {
            panic!("expected book, got {cmd:?}");
        };
        assert_eq!(end - start, chrono::Duration::minutes(30));
    }

    #[test]
    fn plan_subcommands_nest() {
        let office = Ulid::new();
        assert_eq!(
            parse(&format!("plan show {office}")).unwrap(),
            Command::Plan(PlanCommand::Show { office })
        );
        let set = parse(&format!("plan set {office} plan.json")).unwrap();
        assert!(set.mutates());
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert!(parse("slots nope 2030-01-07").unwrap_err().to_string().contains("not an id"));
        let office = Ulid::new();
        assert!(
            parse(&format!("slots {office} 07/01/2030"))
                .unwrap_err()
                .to_string()
                .contains("not a date")
        );
        assert!(parse("frobnicate").is_err());
        assert!(!parse("compact").unwrap().mutates());
        assert!(!parse("office list").unwrap().mutates());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
