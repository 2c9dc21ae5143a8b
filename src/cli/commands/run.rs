//! Run command - compile a script if needed and execute it

use crate::cache::{ArtifactStore, ReclaimPolicy, Registry};
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::ScripResult;
use crate::runner::Runner;
use crate::toolchain::GoToolchain;
use crate::ui::{TaskSpinner, UiContext};
use tracing::{debug, info, warn};

/// Execute the run command, returning the script's exit code
pub async fn execute(args: RunArgs, config: &Config) -> ScripResult<i32> {
    let force = args.force;
    let keep = args.keep;
    let (source, script_args) = args.into_parts();
    let (script, program) = super::load_program(&source, config).await?;

    let (registry, store) = super::open_cache(config).await?;
    let runner = Runner::new(
        registry.clone(),
        store.clone(),
        Box::new(GoToolchain::new(&config.build)),
    )
    .force(force)
    .keep_failed(keep || config.build.keep_failed);

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Compiling {}", script.name()));
    let resolution = runner.resolve(&program).await;
    spinner.clear();
    let resolution = resolution?;
    debug!("Program {} {}", program.key().short(), resolution);

    let code = runner
        .run(program.key(), script.name(), &script_args)
        .await?;

    if config.cache.gc_on_run {
        reclaim_quietly(config, &registry, &store);
    }

    Ok(code)
}

/// Opportunistic reclamation; failures never affect the script's result
fn reclaim_quietly(config: &Config, registry: &Registry, store: &ArtifactStore) {
    let Some(policy) = ReclaimPolicy::from_days(config.cache.gc_days) else {
        return;
    };

    match policy.reclaim(registry, store) {
        Ok(report) if !report.removed.is_empty() => {
            info!("Reclaimed {} unused program(s)", report.removed.len());
        }
        Ok(_) => {}
        Err(e) => warn!("Cache reclamation failed: {}", e),
    }
}
