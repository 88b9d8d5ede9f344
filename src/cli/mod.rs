//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Organizer Store - inspect and maintain the snapshot-backed database
#[derive(Parser, Debug)]
#[command(name = "ostore", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Snapshot directory (default: ~/.organizer-store/data)
    #[arg(long, global = true, env = "OSTORE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database, or restore and migrate the existing snapshot
    Init,

    /// Delete all data and rebuild a freshly seeded database
    Reset {
        /// Required: confirms that all data will be discarded
        #[arg(long)]
        force: bool,
    },

    /// Show schema version, size and per-table row counts
    Stats,

    /// List tables
    Tables,

    /// Execute one raw SQL statement and save the result
    Exec {
        /// SQL statement with `?` placeholders
        sql: String,

        /// Positional parameters (integers, reals, `null`, or text)
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },

    /// Select rows from an allow-listed table
    Query(QueryArgs),

    /// Report schema version and apply pending migrations
    Migrate {
        /// Only report what would be applied
        #[arg(long)]
        check: bool,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Table to read
    pub table: String,

    /// Columns to return (default: every column of the table)
    #[arg(long, short = 'c', value_delimiter = ',')]
    pub columns: Vec<String>,

    /// WHERE condition with `?` placeholders; repeat to AND conditions
    #[arg(long = "where", short = 'w')]
    pub conditions: Vec<String>,

    /// Parameters for the conditions, in order
    #[arg(long = "param", short = 'p')]
    pub params: Vec<String>,

    /// Sort column, optionally suffixed with `:asc` or `:desc`
    #[arg(long)]
    pub order_by: Option<String>,

    /// Maximum rows
    #[arg(long)]
    pub limit: Option<i64>,

    /// Rows to skip
    #[arg(long)]
    pub offset: Option<i64>,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_args() {
        let cli = Cli::parse_from([
            "ostore", "query", "items", "-c", "id,name", "-w", "size > ?", "-p", "10",
            "--order-by", "name:desc", "--limit", "5",
        ]);
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.table, "items");
                assert_eq!(args.columns, vec!["id", "name"]);
                assert_eq!(args.conditions, vec!["size > ?"]);
                assert_eq!(args.params, vec!["10"]);
                assert_eq!(args.order_by.as_deref(), Some("name:desc"));
                assert_eq!(args.limit, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["ostore", "stats", "--json", "--data-dir", "/tmp/x", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    }
}
