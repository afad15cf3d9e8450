use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "event-engine", version, about = "Event ingestion and query engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the ingest queue and maintenance scheduler (default)
    Start,

    /// Load an event report document into the store
    Ingest(crate::commands::ingest::IngestArgs),

    /// Query events for one or more endpoints
    Query(crate::commands::query::QueryArgs),

    /// Show an event timeline as buckets
    Buckets(crate::commands::buckets::BucketsArgs),

    /// Delete events older than the retention window
    Purge(crate::commands::purge::PurgeArgs),

    /// Run the maintenance pipeline once
    Maintenance,

    /// Print the statements generated for a database dialect
    Sql(crate::commands::sql::SqlArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_engine::Severity;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Start));
    }

    #[test]
    fn test_cli_parsing_query() {
        let args = vec![
            "event-engine",
            "query",
            "--endpoint",
            "42",
            "--endpoint",
            "43",
            "--severity",
            "error",
            "--detail",
            "disk",
            "--limit",
            "10",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Query(query) => {
                assert_eq!(query.endpoints, vec![42, 43]);
                assert_eq!(query.severities, vec![Severity::Error]);
                assert_eq!(query.detail.as_deref(), Some("disk"));
                assert_eq!(query.limit, 10);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn test_cli_parsing_query_requires_endpoint() {
        let args = vec!["event-engine", "query"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_rejects_unknown_severity() {
        let args = vec!["event-engine", "query", "-e", "42", "--severity", "loud"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_buckets() {
        let args = vec![
            "event-engine",
            "buckets",
            "--endpoint",
            "42",
            "--begin",
            "0",
            "--end",
            "4000",
            "--buckets",
            "4",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Buckets(buckets) => {
                assert_eq!(buckets.endpoint, 42);
                assert_eq!(buckets.begin, Some(0));
                assert_eq!(buckets.end, Some(4000));
                assert_eq!(buckets.buckets, 4);
                assert!(!buckets.counts);
            }
            _ => panic!("Expected Buckets command"),
        }
    }

    #[test]
    fn test_cli_parsing_sql_dialect() {
        let args = vec!["event-engine", "sql", "--dialect", "oracle"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Sql(sql) => assert_eq!(sql.dialect, "oracle"),
            _ => panic!("Expected Sql command"),
        }
    }

    #[test]
    fn test_cli_parsing_config_validate() {
        let args = vec!["event-engine", "config", "validate"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Config { action } => {
                assert!(matches!(action, ConfigCommands::Validate));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let args = vec!["event-engine", "--config", "custom.toml", "maintenance"];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.get_command(), Commands::Maintenance));
    }
}
