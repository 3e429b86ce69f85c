use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use academic_planner::api::{self, AppState};
use academic_planner::config::{DatabaseConfig, ServerConfig};
use academic_planner::db::{self, PgStore};
use academic_planner::events::ViewInvalidator;
use academic_planner::models::{EnrollmentFilter, Identity};
use academic_planner::store::EnrollmentStore;
use academic_planner::{report, Planner};

#[derive(Parser)]
#[command(name = "academic-planner")]
#[command(about = "Course enrollment tracking and four-year schedule planning", long_about = None)]
struct Cli {
    #[command(flatten)]
    database: DatabaseConfig,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, courses, sessions and enrollments
    Seed,
    /// Import enrollments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print a student's schedule projection as JSON
    Schedule {
        #[arg(long)]
        email: String,
    },
    /// Print the student context used for plan generation
    Context {
        #[arg(long)]
        email: String,
    },
    /// Write a markdown four-year plan
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "plan.md")]
        out: PathBuf,
    },
    /// Remove every planned course for a student
    ClearPlanned {
        #[arg(long)]
        email: String,
    },
    /// Serve the HTTP API
    Serve {
        #[command(flatten)]
        server: ServerConfig,
    },
}

async fn identity_for(planner: &Planner<PgStore>, email: &str) -> anyhow::Result<Identity> {
    let student = planner
        .store()
        .student_by_email(email)
        .await?
        .with_context(|| format!("no student with email {email}"))?;
    Ok(Identity {
        student_id: student.id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pool = cli.database.connect().await?;
    let planner = Planner::new(Arc::new(PgStore::new(pool)), ViewInvalidator::default());

    match cli.command {
        Commands::InitDb => {
            db::init_db(planner.store().pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&planner).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&planner, &csv).await?;
            println!(
                "Applied {} enrollments from {} ({} skipped).",
                summary.applied,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Schedule { email } => {
            let identity = identity_for(&planner, &email).await?;
            match planner.project_schedule(Some(&identity)).await? {
                Some(schedule) => println!("{}", serde_json::to_string_pretty(&schedule)?),
                None => println!("No courses placed on the timeline yet."),
            }
        }
        Commands::Context { email } => {
            let identity = identity_for(&planner, &email).await?;
            let context = planner.student_context(Some(&identity)).await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::Report { email, out } => {
            let student = planner
                .store()
                .student_by_email(&email)
                .await?
                .with_context(|| format!("no student with email {email}"))?;
            let identity = Identity {
                student_id: student.id,
            };
            let schedule = planner.project_schedule(Some(&identity)).await?;
            let enrollments = planner
                .store()
                .find_enrollments(student.id, EnrollmentFilter::default())
                .await?;
            let report = report::build_report(
                &student,
                Utc::now().date_naive(),
                schedule.as_ref(),
                &enrollments,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::ClearPlanned { email } => {
            let identity = identity_for(&planner, &email).await?;
            let deleted = planner.clear_planned(Some(&identity)).await?;
            println!("Removed {deleted} planned courses.");
        }
        Commands::Serve { server } => {
            let mut refreshes = planner.invalidator().subscribe();
            tokio::spawn(async move {
                loop {
                    match refreshes.recv().await {
                        Ok(refresh) => tracing::debug!(
                            student_id = %refresh.student_id,
                            views = ?refresh.views,
                            "views stale"
                        ),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "view refresh listener lagged")
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let router = api::create_router(AppState {
                planner,
                session_cookie: server.session_cookie,
            });
            let listener = tokio::net::TcpListener::bind(server.bind)
                .await
                .with_context(|| format!("failed to bind {}", server.bind))?;
            tracing::info!(addr = %server.bind, "planner API listening");

            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    Ok(())
}
