use agrigate_authz::{AuthorizationService, Role};
use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::output::{print_json, print_permissions_table};

pub fn list(service: &AuthorizationService, role: Option<Role>, format: OutputFormat) -> Result<()> {
    let roles: Vec<Role> = match role {
        Some(role) => vec![role],
        None => Role::ALL.to_vec(),
    };
    let catalog: Vec<_> = roles
        .iter()
        .map(|&role| (role, service.get_role_permissions(role)))
        .collect();

    match format {
        OutputFormat::Json => {
            let doc: serde_json::Map<String, serde_json::Value> = catalog
                .iter()
                .map(|(role, permissions)| (role.to_string(), json!(permissions.as_slice())))
                .collect();
            print_json(&doc)?;
        }
        OutputFormat::Table => {
            let rows: Vec<(String, &_)> = catalog
                .iter()
                .flat_map(|(role, permissions)| {
                    permissions.iter().map(move |p| (role.to_string(), p))
                })
                .collect();
            print_permissions_table(&rows);
            for (role, _) in &catalog {
                println!(
                    "{}: level {}{}",
                    role.to_string().cyan(),
                    role.level(),
                    if service.manager().is_super_admin(*role) {
                        " (super admin)"
                    } else {
                        ""
                    }
                );
            }
        }
    }
    Ok(())
}

pub fn resources(service: &AuthorizationService, format: OutputFormat) -> Result<()> {
    let guard = service.guard();
    match format {
        OutputFormat::Json => {
            let doc: serde_json::Map<String, serde_json::Value> = guard
                .resources()
                .into_iter()
                .filter_map(|name| {
                    let config = guard.config(name)?;
                    Some((name.to_string(), serde_json::to_value(config).ok()?))
                })
                .collect();
            print_json(&doc)?;
        }
        OutputFormat::Table => {
            let mut builder = tabled::builder::Builder::default();
            builder.push_record(["Resource", "Owner field", "Bypass roles", "Custom", "Inherits"]);
            for name in guard.resources() {
                let Some(config) = guard.config(name) else {
                    continue;
                };
                let bypass = config
                    .allowed_roles
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let inherits = config
                    .inheritance_rules
                    .iter()
                    .map(|r| format!("{} ({})", r.parent_resource, r.relationship.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                builder.push_record([
                    name.to_string(),
                    config.ownership_field.clone().unwrap_or_else(|| "-".to_string()),
                    bypass,
                    config.custom_permissions.len().to_string(),
                    inherits,
                ]);
            }
            println!("{}", builder.build().with(tabled::settings::Style::rounded()));
        }
    }
    Ok(())
}
