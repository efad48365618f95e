//! Backlog command line entry point.
//!
//! # Responsibility
//! - Open (and migrate) a backlog database and run one command against it.
//! - Print JSON by default, plain lines with `--human`.

mod cli;

use backlog_core::{
    default_log_level, init_logging, open_db, Actor, BacklogOptions, BacklogPlacement,
    BacklogService, Placement, SqliteJournalRepository, SqliteProjectRepository,
    SqliteSettingsStore, SqliteStoryRepository, StoryService,
};
use clap::Parser;
use cli::{Cli, Commands};
use log::error;
use rusqlite::Connection;
use std::error::Error;
use std::process;

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = init_logging(default_log_level(), log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    if let Err(err) = run(&cli) {
        error!("event=cli_command module=cli status=error error={err}");
        if cli.human {
            eprintln!("Error: {err}");
        } else {
            eprintln!("{}", serde_json::json!({ "error": err.to_string() }));
        }
        process::exit(1);
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    if let Commands::Ping = cli.command {
        println!("backlog_core ping={}", backlog_core::ping());
        println!("backlog_core version={}", backlog_core::core_version());
        return Ok(());
    }

    let conn = open_db(&cli.db)?;
    match &cli.command {
        Commands::Ping => Ok(()),
        Commands::Backlog { project, sprints } => {
            let backlogs =
                backlog_service(&conn)?.backlogs(*project, sprints, &BacklogOptions::default())?;
            if cli.human {
                for (bucket, stories) in &backlogs {
                    println!("{}", bucket_label(*bucket));
                    for ranked in stories {
                        println!(
                            "  {:>3}. #{} {}",
                            ranked.rank, ranked.story.id, ranked.story.subject
                        );
                    }
                }
            } else {
                let buckets: Vec<_> = backlogs
                    .iter()
                    .map(|(bucket, stories)| {
                        serde_json::json!({ "sprint_id": bucket, "stories": stories })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            }
            Ok(())
        }
        Commands::Rank { project, story } => {
            let rank = backlog_service(&conn)?.rank_of(*project, *story)?;
            print_value(cli.human, "rank", serde_json::json!(rank))
        }
        Commands::AtRank {
            project,
            sprint,
            rank,
        } => {
            let story = backlog_service(&conn)?.at_rank(*project, *sprint, *rank)?;
            if cli.human {
                match story {
                    Some(story) => println!("#{} {}", story.id, story.subject),
                    None => println!("no story at rank {rank}"),
                }
                Ok(())
            } else {
                println!("{}", serde_json::to_string_pretty(&story)?);
                Ok(())
            }
        }
        Commands::Move {
            project,
            story,
            after,
            actor,
        } => {
            let placement = after.map_or(Placement::First, Placement::After);
            let plan = story_service(&conn)?.move_after(
                Actor::new(*actor),
                *story,
                BacklogPlacement::new(*project, placement),
            )?;
            print_value(cli.human, "strategy", serde_json::json!(plan.strategy()))
        }
        Commands::Points {
            story,
            value,
            actor,
        } => {
            let points = story_service(&conn)?.set_points(Actor::new(*actor), *story, value)?;
            print_value(cli.human, "story_points", serde_json::json!(points))
        }
        Commands::Tasks { story } => {
            let summary = story_service(&conn)?.task_status(*story)?;
            if cli.human {
                println!("open={} closed={}", summary.open, summary.closed);
            } else {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
    }
}

fn backlog_service(
    conn: &Connection,
) -> CliResult<
    BacklogService<SqliteStoryRepository<'_>, SqliteProjectRepository<'_>, SqliteSettingsStore<'_>>,
> {
    Ok(BacklogService::new(
        SqliteStoryRepository::try_new(conn)?,
        SqliteProjectRepository::new(conn),
        SqliteSettingsStore::new(conn),
    ))
}

fn story_service(
    conn: &Connection,
) -> CliResult<
    StoryService<
        SqliteStoryRepository<'_>,
        SqliteProjectRepository<'_>,
        SqliteSettingsStore<'_>,
        SqliteJournalRepository<'_>,
    >,
> {
    Ok(StoryService::new(
        SqliteStoryRepository::try_new(conn)?,
        SqliteProjectRepository::new(conn),
        SqliteSettingsStore::new(conn),
        SqliteJournalRepository::new(conn),
    ))
}

fn print_value(human: bool, key: &str, value: serde_json::Value) -> CliResult<()> {
    if human {
        println!("{key}={value}");
    } else {
        println!("{}", serde_json::json!({ key: value }));
    }
    Ok(())
}

fn bucket_label(bucket: Option<i64>) -> String {
    match bucket {
        Some(sprint_id) => format!("sprint {sprint_id}"),
        None => "unscheduled".to_string(),
    }
}
