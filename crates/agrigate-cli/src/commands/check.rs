use agrigate_authz::{AuthenticatedUser, AuthorizationService, CheckOptions, Permission, PermissionContext};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

use crate::cli::{CheckArgs, OutputFormat};
use crate::output::{print_decision, print_json, print_success};

const CLI_GRANTOR: &str = "agrigate-cli";

pub async fn run(service: &AuthorizationService, args: &CheckArgs, format: OutputFormat) -> Result<()> {
    let user = AuthenticatedUser::new(&args.user.user_id, format!("{}@cli.local", args.user.user_id), args.user.role);

    for grant in &args.grants {
        let permission = parse_grant(grant)?;
        let grant = service
            .grant_dynamic_permission(CLI_GRANTOR, &user.id, permission, None)
            .await?;
        if matches!(format, OutputFormat::Table) {
            print_success(&format!("Granted {} to {}", grant.permission, user.id));
        }
    }

    let mut context = match &args.context {
        Some(raw) => PermissionContext::from_value(Value::Object(parse_object(raw, "--context")?)),
        None => PermissionContext::new(),
    };
    if let Some(raw) = &args.record {
        context = context.with_resource(parse_object(raw, "--record")?);
    }
    let context = (!context.is_empty()).then_some(context);
    let options = if args.strict {
        CheckOptions::strict()
    } else {
        CheckOptions::default()
    };

    let result = service
        .check_permission(&user, &args.resource, &args.action, args.id.as_deref(), context.as_ref(), options)
        .await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_decision(&result),
    }
    Ok(())
}

fn parse_grant(raw: &str) -> Result<Permission> {
    let Some((resource, action)) = raw.split_once(':') else {
        bail!("grant '{raw}' must be resource:action");
    };
    Ok(Permission::new(resource, action))
}

fn parse_object(raw: &str, flag: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        _ => bail!("{flag} must be a JSON object"),
    }
}
