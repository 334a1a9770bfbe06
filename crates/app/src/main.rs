use std::{error::Error, sync::Arc};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use engine::{AllowedCurrencies, BillOutcome, Engine, FixedClock, TracingAuditRecorder};
use migration::{Migrator, MigratorTrait};
use settings::{Database, Settings};
use uuid::Uuid;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "finledger")]
#[command(about = "Ledger maintenance and the periodic recurring bill trigger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Generate every recurring bill due today. Meant to be run by cron.
    RunDueBills(RunDueBillsArgs),
    /// Generate one bill now, on behalf of its owner.
    GenerateBill(GenerateBillArgs),
    User(User),
}

#[derive(Args, Debug)]
struct RunDueBillsArgs {
    /// Pretend today is this date (YYYY-MM-DD).
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct GenerateBillArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    bill: Uuid,
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "finledger={level},engine={level},audit={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    if matches!(cli.command, Command::Migrate) {
        tracing::info!("schema is up to date");
        return Ok(());
    }

    let mut builder = Engine::builder()
        .database(db)
        .audit_recorder(Arc::new(TracingAuditRecorder));
    if !settings.currencies.allowed.is_empty() {
        builder = builder.currencies(Arc::new(AllowedCurrencies::new(
            &settings.currencies.allowed,
        )?));
    }
    if let Command::RunDueBills(RunDueBillsArgs { today: Some(today) }) = &cli.command {
        builder = builder.clock(Arc::new(FixedClock::on(*today)));
    }
    let engine = builder.build().await?;

    match cli.command {
        Command::Migrate => {}
        Command::RunDueBills(_) => {
            let report = engine.run_due_bills().await?;
            for (bill_id, outcome) in &report.outcomes {
                match outcome {
                    BillOutcome::Generated { transaction_id } => {
                        println!("{bill_id}: generated {transaction_id}");
                    }
                    BillOutcome::Skipped => println!("{bill_id}: skipped"),
                    BillOutcome::Failed(err) => println!("{bill_id}: failed: {err}"),
                }
            }
            println!(
                "generated {}, skipped {}, failed {}",
                report.generated(),
                report.skipped(),
                report.failed()
            );
        }
        Command::GenerateBill(args) => {
            match engine.generate_bill_now(&args.user, args.bill).await? {
                Some(transaction_id) => println!("generated {transaction_id}"),
                None => println!("bill {} is not due", args.bill),
            }
        }
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            engine.new_user(&args.username, &args.email).await?;
            println!("user {} created", args.username);
        }
    }

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
