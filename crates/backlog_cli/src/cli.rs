//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and reorder sprint backlogs stored in a backlog database.
#[derive(Parser, Debug)]
#[command(name = "backlog", version, about, long_about = None)]
pub struct Cli {
    /// SQLite database file. Created and migrated when missing.
    #[arg(long, global = true, env = "BACKLOG_DB", default_value = "backlog.sqlite3")]
    pub db: PathBuf,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, global = true, env = "BACKLOG_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Print human-readable lines instead of JSON.
    #[arg(short = 'H', long = "human", global = true)]
    pub human: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check core linkage.
    Ping,

    /// List ranked stories of a project per bucket.
    Backlog {
        project: i64,
        /// Sprint id, or `none` for unscheduled stories. Repeatable.
        #[arg(long = "sprint", value_parser = parse_bucket, default_value = "none")]
        sprints: Vec<Option<i64>>,
    },

    /// Print the rank of one story inside a project's backlog.
    Rank { project: i64, story: i64 },

    /// Print the story at a 1-based rank.
    AtRank {
        project: i64,
        /// Sprint id; unscheduled stories when omitted.
        #[arg(long)]
        sprint: Option<i64>,
        rank: u32,
    },

    /// Move a story inside a project's backlog, after another story or
    /// first when `--after` is omitted.
    Move {
        project: i64,
        story: i64,
        #[arg(long)]
        after: Option<i64>,
        /// User recorded in the journal.
        #[arg(long, env = "BACKLOG_ACTOR", default_value_t = 1)]
        actor: i64,
    },

    /// Set story points from free-form input (`-` clears, `s` means 0).
    Points {
        story: i64,
        #[arg(allow_hyphen_values = true)]
        value: String,
        #[arg(long, env = "BACKLOG_ACTOR", default_value_t = 1)]
        actor: i64,
    },

    /// Show open and closed task counts of a story.
    Tasks { story: i64 },
}

fn parse_bucket(value: &str) -> Result<Option<i64>, String> {
    match value.trim() {
        "none" | "" => Ok(None),
        other => other
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("expected a sprint id or `none`, got `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_bucket, Cli, Commands};
    use clap::Parser;

    #[test]
    fn bucket_accepts_none_and_ids() {
        assert_eq!(parse_bucket("none"), Ok(None));
        assert_eq!(parse_bucket("12"), Ok(Some(12)));
        assert!(parse_bucket("next").is_err());
    }

    #[test]
    fn backlog_collects_repeated_sprints() {
        let cli = Cli::parse_from([
            "backlog", "backlog", "4", "--sprint", "none", "--sprint", "7",
        ]);
        match cli.command {
            Commands::Backlog { project, sprints } => {
                assert_eq!(project, 4);
                assert_eq!(sprints, vec![None, Some(7)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn move_takes_backlog_project_and_story() {
        let cli = Cli::parse_from(["backlog", "move", "1", "9", "--after", "4"]);
        match cli.command {
            Commands::Move {
                project,
                story,
                after,
                ..
            } => {
                assert_eq!((project, story, after), (1, 9, Some(4)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn points_accepts_dash_value() {
        let cli = Cli::parse_from(["backlog", "points", "3", "-"]);
        assert!(matches!(cli.command, Commands::Points { value, .. } if value == "-"));
    }
}
