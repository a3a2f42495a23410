pub mod commands;

use clap::{Parser, Subcommand};

use crate::app::CoursewareError;

#[derive(Parser)]
#[command(name = "courseware")]
#[command(about = "A terminal client for Open edX courses", long_about = None)]
pub struct Cli {
    /// Serve cached data only, never touch the network
    #[arg(long, global = true)]
    pub offline: bool,

    /// Use this config file instead of ~/.config/courseware/config.toml
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with a username or email
    Login {
        username: String,
        /// Password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out and revoke the refresh token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List enrolled courses
    Courses,
    /// Show the block tree of a course
    Structure {
        course: String,
        /// Fetch a fresh copy even if one is cached
        #[arg(long)]
        refresh: bool,
    },
    /// Show the last visited block of a course
    Resume { course: String },
    /// Mark blocks as completed
    Complete {
        course: String,
        #[arg(required = true)]
        blocks: Vec<String>,
    },
    /// Manage offline downloads
    Download {
        #[command(subcommand)]
        action: DownloadAction,
    },
    /// Open a block in the browser
    Open { course: String, block: String },
}

#[derive(Subcommand)]
pub enum DownloadAction {
    /// Queue the media under the given blocks
    Add {
        course: String,
        #[arg(required = true)]
        blocks: Vec<String>,
    },
    /// List queued and finished downloads
    List,
    /// Remove a download and its file
    Remove { id: String },
    /// Download everything that is waiting
    Run,
}

/// One-line message for a failed command.
pub fn describe_error(error: &CoursewareError) -> String {
    if error.is_internet_error() {
        return "No connection".to_string();
    }
    match error {
        CoursewareError::Validation(message) => message.clone(),
        CoursewareError::Unauthorized(_) => "Session expired, sign in again".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_add() {
        let cli = Cli::parse_from(["courseware", "--offline", "download", "add", "c", "b1", "b2"]);
        assert!(cli.offline);
        match cli.command {
            Commands::Download {
                action: DownloadAction::Add { course, blocks },
            } => {
                assert_eq!(course, "c");
                assert_eq!(blocks, vec!["b1", "b2"]);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_describe_validation_error() {
        let err = CoursewareError::Validation("Password must not be empty".into());
        assert_eq!(describe_error(&err), "Password must not be empty");
    }
}
