use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lineup_sync::config::{AppConfig, CliConfig, FileConfig, DEFAULT_NOTE_DEBOUNCE_MS};
use lineup_sync::document_store::{DocumentStore, SqliteDocumentStore};
use lineup_sync::filter::{filter_acts, genre_options, LineupFilter};
use lineup_sync::lineup::{import_lineup, Day, LineupFile, ScoreField};
use lineup_sync::preferences::{display_label, ReviewerVisibility, SqlitePreferenceStore};
use lineup_sync::sync::{LineupSession, MutationRouting, ReconcilePolicy};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_day(s: &str) -> Result<Day> {
    match Day::parse(s) {
        Some(day) => Ok(day),
        None => bail!("Unknown day: {}", s),
    }
}

#[derive(Parser, Debug)]
#[clap(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI ones.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the lineup and preferences databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Name of the lineup collection.
    #[clap(long, default_value = "lineup")]
    pub collection: String,

    /// Quiet period before a note edit is written.
    #[clap(long, default_value_t = DEFAULT_NOTE_DEBOUNCE_MS)]
    pub note_debounce_ms: u64,

    /// How local edits are kept on top of incoming snapshots.
    #[clap(long, default_value = "local-echo")]
    pub reconcile_policy: ReconcilePolicy,

    /// How rating writes locate their record.
    #[clap(long, default_value = "display-name")]
    pub mutation_routing: MutationRouting,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed an empty collection from a lineup JSON file.
    Import {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },
    /// Print the lineup, optionally filtered.
    List {
        #[clap(long, default_value = "")]
        search: String,
        #[clap(long)]
        genre: Vec<String>,
        #[clap(long, value_parser = parse_day)]
        day: Vec<Day>,
    },
    /// Rate an act. A score of 0 clears it.
    Rate {
        artist: String,
        reviewer: String,
        #[clap(long)]
        like: Option<u8>,
        #[clap(long)]
        rowdy: Option<u8>,
        #[clap(long)]
        notes: Option<String>,
    },
    /// Print the reviewers and whether their ratings are shown.
    Reviewers,
    /// Show or hide the ratings of a reviewer.
    ToggleReviewer { name: String },
    /// Follow the lineup and print every change until interrupted.
    Watch,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            collection: self.collection.clone(),
            note_debounce_ms: self.note_debounce_ms,
            reconcile_policy: self.reconcile_policy,
            mutation_routing: self.mutation_routing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!(
        "Opening lineup database at {:?}...",
        config.document_db_path()
    );
    let store: Arc<dyn DocumentStore> =
        Arc::new(SqliteDocumentStore::new(config.document_db_path())?);

    if let Command::Import { file } = &cli_args.command {
        let lineup = LineupFile::load(file)?;
        let summary = import_lineup(store.as_ref(), &config.collection, lineup).await?;
        if summary.skipped {
            println!("Collection '{}' is not empty, nothing imported", config.collection);
        } else {
            println!("Imported {} acts ({} failed)", summary.inserted, summary.failed);
        }
        return Ok(());
    }

    let session = LineupSession::open(store, config.session_config()).await;
    let result = run_command(&cli_args.command, &config, &session).await;
    session.shutdown().await;
    result
}

async fn run_command(command: &Command, config: &AppConfig, session: &LineupSession) -> Result<()> {
    let state = session.ready().await;

    match command {
        Command::Import { .. } => Ok(()),
        Command::List { search, genre, day } => {
            let visibility = open_visibility(config, session)?;
            let filter = LineupFilter::default()
                .with_search(search.as_str())
                .with_genres(genre.iter().cloned())
                .with_days(day.iter().copied());
            let acts = filter_acts(state.snapshot.acts(), &filter);
            for act in &acts {
                println!("{} [{}] {}", act.artist, act.day, act.genre.join(", "));
                for rating in visibility.visible_ratings(act) {
                    println!(
                        "    {}: like {} rowdy {} {}",
                        display_label(&rating.name),
                        format_score(rating.like),
                        format_score(rating.rowdy),
                        rating.notes
                    );
                }
            }
            println!(
                "{} of {} acts (genres: {})",
                acts.len(),
                state.snapshot.len(),
                genre_options(state.snapshot.acts()).join(", ")
            );
            Ok(())
        }
        Command::Rate {
            artist,
            reviewer,
            like,
            rowdy,
            notes,
        } => {
            let Some(act) = state.snapshot.find_by_artist(artist) else {
                bail!("No act named '{}'", artist);
            };
            let act_id = act.id.clone();

            let mut writes = Vec::new();
            if let Some(like) = like {
                writes.push(session.set_score(&act_id, reviewer, ScoreField::Like, Some(*like))?);
            }
            if let Some(rowdy) = rowdy {
                writes.push(session.set_score(&act_id, reviewer, ScoreField::Rowdy, Some(*rowdy))?);
            }
            if let Some(notes) = notes {
                session.edit_note(&act_id, reviewer, notes)?;
            }

            for write in writes {
                let outcome = write.await?;
                if !outcome.is_applied() {
                    warn!("Rating of '{}' was not written: {:?}", artist, outcome);
                }
            }
            session.flush_notes().await;
            println!("Rated '{}' as {}", artist, display_label(reviewer));
            Ok(())
        }
        Command::Reviewers => {
            let visibility = open_visibility(config, session)?;
            for reviewer in visibility.reviewers() {
                let shown = if reviewer.show { "shown" } else { "hidden" };
                println!("{} ({})", display_label(&reviewer.name), shown);
            }
            Ok(())
        }
        Command::ToggleReviewer { name } => {
            let mut visibility = open_visibility(config, session)?;
            match visibility.toggle(name)? {
                Some(true) => println!("{} is now shown", display_label(name)),
                Some(false) => println!("{} is now hidden", display_label(name)),
                None => bail!("Unknown reviewer '{}'", name),
            }
            Ok(())
        }
        Command::Watch => {
            let mut receiver = session.watch();
            loop {
                {
                    let state = receiver.borrow_and_update();
                    println!(
                        "{} acts, {} reviewers (delivery #{})",
                        state.snapshot.len(),
                        state.snapshot.reviewers().len(),
                        state.deliveries
                    );
                }
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, shutting down");
                        return Ok(());
                    }
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn open_visibility(config: &AppConfig, session: &LineupSession) -> Result<ReviewerVisibility> {
    let preferences = Arc::new(SqlitePreferenceStore::new(config.preferences_db_path())?);
    ReviewerVisibility::load_or_derive(preferences, &session.snapshot())
}

fn format_score(score: Option<u8>) -> String {
    match score {
        Some(score) => score.to_string(),
        None => "-".to_string(),
    }
}
