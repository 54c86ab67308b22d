use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dms-client")]
#[command(about = "Command-line dashboard for the document management API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        fullname: String,
        #[arg(long, env = "DMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and clear the local cache
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Show where the route guard sends you for a path
    Route { path: String },
    /// List your documents
    Ls(ListArgs),
    /// Upload a document
    Upload {
        path: PathBuf,
        /// Label stored with the document (defaults to the MIME type)
        #[arg(long)]
        document_type: Option<String>,
    },
    /// Delete a document by id
    Rm { id: i64 },
    /// Download a document by id or filename
    Get {
        target: String,
        #[arg(long, short, default_value = ".")]
        out: PathBuf,
    },
    /// Print a preview link for a document
    Preview { filename: String },
    /// Dashboard totals
    Stats,
    /// Administrator tools
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Keep loading pages until everything is shown
    #[arg(long)]
    pub all: bool,
    /// Case-insensitive filename filter
    #[arg(long)]
    pub filter: Option<String>,
    /// Only show one kind (pdf, docx, txt)
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Find users by email or name
    Search { query: String },
    /// Latest uploads across all users
    Recent {
        #[arg(long, default_value_t = crate::services::admin::DEFAULT_RECENT_LIMIT)]
        limit: u32,
    },
    /// List another user's documents
    ViewAs {
        email: String,
        #[arg(long)]
        all: bool,
    },
}
