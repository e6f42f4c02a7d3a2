//! `fabricctl apply`: discover, diff, snapshot, then run the pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use fabricctl_core::predicates::initialize_all;
use fabricctl_core::{
    DeployMode, Orchestrator, PolicyFilter, PolicyStore, PredicateConfig, PredicateContext,
    PredicateRegistry, RunReport, Scope, UnitFilter, compute_change_set,
};

use super::util;
use crate::cli::{ApplyArgs, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::files::{self, SnapshotFile};
use crate::output;
use crate::patterns::{self, FREEFORM_TEMPLATE, RegexExtractor};
use crate::progress;

/// Structured output of one apply.
#[derive(Debug, Serialize)]
struct ApplyOutput {
    dry_run: bool,
    snapshot: Option<PathBuf>,
    changes: Vec<output::PlannedChange>,
    report: RunReport,
}

/// Predicate inputs from flags and files, read before connecting.
fn predicate_config(args: &ApplyArgs) -> Result<PredicateConfig, CliError> {
    let desired = args.desired.as_deref().map(files::read_desired).transpose()?;
    let description_source = if desired.is_none() {
        let extractor = RegexExtractor::new(&args.freeform_pattern)?;
        Some(Arc::new(extractor) as Arc<dyn fabricctl_core::Extractor>)
    } else {
        None
    };
    Ok(PredicateConfig {
        desired,
        description_source,
        description_scope: if args.leaf_only_descriptions {
            Scope::LeafOnly
        } else {
            Scope::AnySwitch
        },
        uplinks: args.uplinks.as_deref().map(files::read_uplinks).transpose()?,
        mgmt: args.mgmt,
    })
}

pub async fn handle(args: ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let dry_run = !args.deploy.deploy;
    let mut resolved = config::resolve(global)?;
    resolved.controller.dry_run = dry_run;
    let options = util::run_options(resolved.options.clone(), &args.deploy, dry_run);

    let registry = PredicateRegistry::builtin();
    let mut predicates = registry.create(args.plugins.as_slice())?;
    let predicate_config = predicate_config(&args)?;
    let wants = |name: &str| predicates.iter().any(|p| p.name() == name);
    let needs_freeform = wants("desc") && predicate_config.desired.is_none();
    let needs_details = wants("orphan-port");

    let serials = util::selection(&args.selection)?;
    let session = util::connect(&resolved).await?;
    util::with_logout(&session, async {
        let mut spinner = progress::sink(global.quiet);

        spinner.stage("discovering switches");
        let mut inventory = util::discover(&session, serials.as_ref()).await?;
        if options.deploy_mode == DeployMode::Switch {
            inventory.resolve_peers(&session).await?;
        }
        if needs_details {
            inventory.fetch_details(&session).await?;
        }

        spinner.stage("reading interfaces");
        let mut store = PolicyStore::new();
        store
            .fetch_units(&session, &inventory, None, &UnitFilter::new())
            .await?;
        if needs_freeform {
            let filter =
                PolicyFilter::new().template_name(patterns::template_is(FREEFORM_TEMPLATE));
            store.fetch_policies(&session, &inventory, None, &filter).await?;
        }

        let ctx = PredicateContext {
            inventory: &inventory,
            policies: &store,
            config: &predicate_config,
        };
        initialize_all(&mut predicates, &ctx)?;
        let (changes, snapshot) = compute_change_set(&store.units(), &inventory, &predicates)?;
        spinner.finish();

        let planned = output::planned_changes(&changes, &snapshot);
        let structured = !matches!(global.output, OutputFormat::Table | OutputFormat::Plain);
        if !structured {
            let out = output::render_list(&global.output, &planned, output::change_row, |c| {
                c.unit.to_string()
            })?;
            output::print_output(&out, global.quiet);
        }

        if changes.is_empty() && snapshot.superseded_policies().is_empty() {
            info!("nothing to change");
            if structured {
                let out =
                    output::render_list(&global.output, &planned, output::change_row, |c| {
                        c.unit.to_string()
                    })?;
                output::print_output(&out, global.quiet);
            } else if !global.quiet {
                eprintln!("No changes.");
            }
            return Ok(());
        }

        let snapshot_path = args.snapshot.clone().or_else(|| {
            (!dry_run).then(|| PathBuf::from(files::default_snapshot_name(Utc::now())))
        });
        if let Some(path) = &snapshot_path {
            SnapshotFile::new(resolved.controller.url.as_str(), snapshot.clone()).write(path)?;
            if !global.quiet {
                eprintln!("Snapshot written to {}", path.display());
            }
        }

        if dry_run {
            warn!("dry run: requests that change the controller are not sent");
        }
        let cancel = util::cancel_on_ctrl_c();
        let orchestrator = Orchestrator::new(&session, &inventory, options);
        let mut spinner = progress::sink(global.quiet);
        let report = orchestrator
            .run(&changes, snapshot.superseded_policies(), &cancel, spinner.as_mut())
            .await?;

        let color = output::should_color(&global.color);
        let result = ApplyOutput {
            dry_run,
            snapshot: snapshot_path,
            changes: planned,
            report,
        };
        let out = output::render_single(
            &global.output,
            &result,
            |r| output::report_detail(&r.report, color),
            |r| output::report_failures(&r.report),
        )?;
        output::print_output(&out, global.quiet);
        if dry_run && !global.quiet {
            eprintln!("Dry run; pass --deploy to apply these changes.");
        }

        util::check_report(&result.report)
    })
    .await
}
