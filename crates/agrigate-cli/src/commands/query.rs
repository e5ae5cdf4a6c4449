use agrigate_authz::{AccessQuery, AuthenticatedUser, AuthorizationService};
use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::cli::{OutputFormat, QueryArgs};
use crate::output::print_json;

pub fn run(service: &AuthorizationService, args: &QueryArgs, format: OutputFormat) -> Result<()> {
    let user = AuthenticatedUser::new(&args.user.user_id, format!("{}@cli.local", args.user.user_id), args.user.role);
    let query = service.build_access_query(&user, &args.resource, &args.action);

    match format {
        OutputFormat::Json => print_json(&json!({
            "query": query,
            "filter": query.to_filter_document(),
        }))?,
        OutputFormat::Table => {
            let summary = match &query {
                AccessQuery::All => "all records".green(),
                AccessQuery::None => "no records".red(),
                AccessQuery::Any(clauses) => format!("{} clause(s)", clauses.len()).yellow(),
            };
            println!(
                "{} {} may {} {}: {}",
                "User".cyan(),
                user.id,
                args.action,
                args.resource,
                summary
            );
            println!("{}", serde_json::to_string_pretty(&query.to_filter_document())?);
        }
    }
    Ok(())
}
