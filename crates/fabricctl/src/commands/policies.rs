//! `fabricctl policies`: filtered policy listing.

use std::collections::BTreeSet;

use fabricctl_api::Session;
use fabricctl_core::{PolicyFilter, PolicyRecord, PolicyStore};

use super::util;
use crate::cli::{GlobalOpts, PoliciesArgs};
use crate::config;
use crate::error::CliError;
use crate::output;
use crate::patterns;

fn filter(args: &PoliciesArgs) -> Result<PolicyFilter, CliError> {
    Ok(PolicyFilter {
        description: patterns::matchers(&args.description, "description")?,
        entity_name: patterns::matchers(&args.entity_name, "entity-name")?,
        entity_type: patterns::matchers(&args.entity_type, "entity-type")?,
        template_name: patterns::matchers(&args.template, "template")?,
        generated_config: patterns::matchers(&args.config, "config")?,
        fabric: args.fabric.clone(),
    })
}

pub async fn handle(args: PoliciesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let filter = filter(&args)?;
    let resolved = config::resolve(global)?;
    let serials = util::optional_selection(&args.selection)?;
    let session = util::connect(&resolved).await?;
    util::with_logout(&session, list(&session, serials.as_ref(), &filter, global)).await
}

async fn list(
    session: &Session,
    serials: Option<&BTreeSet<String>>,
    filter: &PolicyFilter,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let inventory = util::discover(session, serials).await?;
    let mut store = PolicyStore::new();
    store.fetch_policies(session, &inventory, None, filter).await?;

    let policies: Vec<PolicyRecord> = store.policies().into_values().flatten().collect();
    let out = output::render_list(&global.output, &policies, output::policy_row, |p| {
        p.policy_id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
