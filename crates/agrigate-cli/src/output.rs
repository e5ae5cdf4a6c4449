use agrigate_authz::PermissionCheckResult;
use agrigate_authz::types::Permission;
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_permissions_table(rows: &[(String, &Permission)]) {
    if rows.is_empty() {
        println!("No permissions.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Role", "Resource", "Action", "Conditions"]);
    for (role, permission) in rows {
        let conditions = if permission.conditions.is_empty() {
            "-".to_string()
        } else {
            permission
                .conditions
                .iter()
                .map(|c| format!("{} {} {}", c.field, c.operator, serde_json::Value::from(c.value.clone())))
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        builder.push_record([
            role.as_str(),
            permission.resource.as_str(),
            permission.action.as_str(),
            conditions.as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_decision(result: &PermissionCheckResult) {
    let verdict = if result.allowed {
        "ALLOWED".green().bold()
    } else {
        "DENIED".red().bold()
    };
    println!("{verdict}: {}", result.reason);

    if let Some(applied) = &result.applied_permissions {
        for permission in applied {
            println!("  {} {}", "via".cyan(), permission);
        }
    }

    if let Some(evaluated) = &result.evaluated_conditions {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Operator", "Actual", "Expected", "Passed"]);
        for c in evaluated {
            let actual = c
                .actual
                .as_ref()
                .map_or_else(|| "(absent)".to_string(), ToString::to_string);
            builder.push_record([
                c.condition.field.clone(),
                c.condition.operator.to_string(),
                actual,
                c.expected.to_string(),
                c.passed.to_string(),
            ]);
        }
        println!("{}", builder.build().with(Style::rounded()));
    }
}
