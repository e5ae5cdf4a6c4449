use std::path::PathBuf;

use agrigate_authz::Role;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "agrigate")]
#[command(about = "agrigate permission engine: inspect the catalog and evaluate decisions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./agrigate.toml when present)
    #[arg(short, long, global = true, env = "AGRIGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log filter used when RUST_LOG is unset (overrides the configured level)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List role permissions
    Roles(RolesArgs),
    /// List guarded resource types
    Resources,
    /// Evaluate a permission check
    Check(CheckArgs),
    /// Build the access filter for a user
    Query(QueryArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct RolesArgs {
    /// Only this role (ADMIN, DINAS, POPT, PPL)
    pub role: Option<Role>,
}

#[derive(clap::Args)]
pub struct UserArgs {
    /// User id
    #[arg(long = "user", default_value = "cli-user")]
    pub user_id: String,
    /// User role
    #[arg(long)]
    pub role: Role,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub user: UserArgs,
    /// Resource type (e.g. submissions)
    pub resource: String,
    /// Action (e.g. approve)
    pub action: String,
    /// Target record id
    #[arg(long)]
    pub id: Option<String>,
    /// Request fields as a JSON object
    #[arg(long)]
    pub context: Option<String>,
    /// Target record snapshot as a JSON object
    #[arg(long)]
    pub record: Option<String>,
    /// Dynamic grants to apply first, as resource:action
    #[arg(long = "grant")]
    pub grants: Vec<String>,
    /// Evaluate super admins like any other role
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub user: UserArgs,
    /// Resource type (e.g. submissions)
    pub resource: String,
    /// Action
    #[arg(default_value = "view")]
    pub action: String,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show(ConfigShowArgs),
    /// Validate the configuration and report problems
    Validate,
}

#[derive(clap::Args)]
pub struct ConfigShowArgs {
    /// Print as TOML instead of the selected format
    #[arg(long)]
    pub toml: bool,
}
