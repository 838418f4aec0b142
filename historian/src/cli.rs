use clap::{Parser, Subcommand};

/// Historian - ask a process historian database questions in plain language
#[derive(Parser, Debug)]
#[command(name = "historian")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat with the reporting assistant
    Chat {
        /// Session id (default: a new random session)
        #[arg(long)]
        session: Option<String>,

        /// User id (default: HISTORIAN_USER_ID or demo_user)
        #[arg(long)]
        user: Option<String>,

        /// Show tool calls and their results
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Session id; reuse it across calls only within one process
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Run the HTTP server (agent SSE endpoint, sessions, artifacts)
    Serve {
        /// Bind address (default: HISTORIAN_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Port (default: HISTORIAN_PORT / PORT or 8000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check that the historian database is reachable
    #[command(name = "check-db")]
    CheckDb,

    /// Run a read-only SQL query and print a preview of the rows
    Sql {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Rows to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["historian", "serve", "--port", "9000"]);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_db_and_sql() {
        assert!(matches!(
            Cli::parse_from(["historian", "check-db"]).command,
            Commands::CheckDb
        ));
        match Cli::parse_from(["historian", "sql", "SELECT 1"]).command {
            Commands::Sql { query, limit } => {
                assert_eq!(query, "SELECT 1");
                assert_eq!(limit, 20);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
