use agrigate_authz::AuthzConfig;
use agrigate_authz::policy::default_catalog;
use agrigate_authz::guard::default_guard_registry;
use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::output::{print_json, print_success};

/// Print the effective configuration, with the built-in catalog and guard
/// registry filled in where no override is set.
pub fn show(config: &AuthzConfig, as_toml: bool, format: OutputFormat) -> Result<()> {
    let mut effective = config.clone();
    effective.roles.get_or_insert_with(default_catalog);
    effective.resources.get_or_insert_with(default_guard_registry);

    if as_toml {
        println!("{}", toml::to_string_pretty(&effective)?);
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_json(&effective)?,
        OutputFormat::Table => {
            println!("{}", "Cache".cyan().bold());
            println!("  enabled: {}", effective.cache.enabled);
            println!("  decision ttl: {:?}", effective.cache.decision_ttl);
            println!("  snapshot ttl: {:?}", effective.cache.snapshot_ttl);
            println!("  operation timeout: {:?}", effective.cache.operation_timeout);
            println!("{}", "Audit".cyan().bold());
            println!("  enabled: {}", effective.audit.enabled);
            println!("  batch size: {}", effective.audit.batch_size);
            println!("  flush interval: {:?}", effective.audit.flush_interval);
            println!("  sink: {:?}", effective.audit.sink);
            println!("{}", "Manager".cyan().bold());
            println!("  super admin roles: {:?}", effective.manager.super_admin_roles);
            println!(
                "{}: {}",
                "Catalog".cyan().bold(),
                if config.roles.is_some() { "override" } else { "built-in" }
            );
            println!(
                "{}: {}",
                "Guards".cyan().bold(),
                if config.resources.is_some() { "override" } else { "built-in" }
            );
        }
    }
    Ok(())
}

pub fn validate(config: &AuthzConfig) -> Result<()> {
    config.validate()?;
    print_success("Configuration is valid");
    Ok(())
}
