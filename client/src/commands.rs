use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

use common::{
    config, load_catalog, load_manifest, Dataset, DatasetGroups, PlannerConfig, Request,
    SelectOptions, TaskLayout, VariationCatalog,
};
use harvester::{default_merge_concurrency, plan_harvest, Hadd, HarvestOptions};
use preparer::{
    PrepareOptions, ResourceSpec, RunRecord, ScriptOptions, SubmitScript,
    DEFAULT_PREPARE_CONCURRENCY,
};

use crate::cli::{HarvestArgs, PrepareArgs, TaskArgs};

/* ==== carga común ==== */

/// Datasets y catálogo de variaciones, más el directorio de instalación.
struct Inputs {
    install_dir: PathBuf,
    datasets: Vec<Arc<Dataset>>,
    catalog: VariationCatalog,
}

fn load_inputs(args: &TaskArgs) -> Result<Inputs> {
    let install_dir = match &args.install_dir {
        Some(dir) => dir.clone(),
        None => config::install_base()?,
    };

    let master_config = install_dir.join("config").join(&args.config);
    let stems_config = if master_config.is_file() {
        Some(master_config.as_path())
    } else {
        warn!(
            "no existe la configuración {}; se cargan los datasets sin stems",
            master_config.display()
        );
        None
    };

    let datasets = load_manifest(&args.manifest, stems_config)
        .with_context(|| format!("no se pudo cargar el manifiesto {}", args.manifest.display()))?;
    info!("{} datasets en {}", datasets.len(), args.manifest.display());

    let catalog = if Request::needs_catalog(&args.syst) {
        let path = args
            .syst_config
            .clone()
            .unwrap_or_else(|| install_dir.join("config").join("syst.yaml"));
        load_catalog(&path).with_context(|| {
            format!("no se pudo cargar el catálogo de variaciones {}", path.display())
        })?
    } else {
        VariationCatalog::default()
    };

    Ok(Inputs {
        install_dir,
        datasets: datasets.into_iter().map(Arc::new).collect(),
        catalog,
    })
}

fn select_options(args: &TaskArgs) -> SelectOptions {
    SelectOptions {
        skip_nominal: false,
        combine_weights: !args.split_weights,
    }
}

fn planner_config(args: &TaskArgs) -> PlannerConfig {
    PlannerConfig {
        events_per_job: Some(args.events_per_job),
        ..PlannerConfig::default()
    }
}

/* ==== prepare-jobs ==== */

/// Devuelve `false` si algún par (variación, dataset) falló.
pub async fn prepare_jobs(args: PrepareArgs) -> Result<bool> {
    let inputs = load_inputs(&args.task)?;
    let layout = TaskLayout::absolute(&args.task.task_dir)?;
    layout.create_job_dirs()?;

    let mut script = ScriptOptions::new(layout.clone(), &inputs.install_dir, args.task.config.clone());
    script.prog = args.prog;
    script.prog_args = args.prog_args;
    script.prefix = args.task.prefix.clone();
    script.analysis = args.analysis;
    script.dd_photon = args.dd_photon;
    script.local_copy = args.local_copy;
    script.copy_command = args.copy_command;
    if args.express {
        info!("los jobs irán a la cola express");
        script.resources = ResourceSpec::express();
    }

    let options = PrepareOptions {
        request: args.task.syst.clone(),
        select: select_options(&args.task),
        planner: planner_config(&args.task),
        script,
        concurrency: config::env_usize("PREPARE_CONCURRENCY", DEFAULT_PREPARE_CONCURRENCY),
    };

    let submitter = Arc::new(SubmitScript::open(&layout)?);
    let submit_path = submitter.path().to_path_buf();
    let report = preparer::prepare(&inputs.datasets, &inputs.catalog, options, submitter).await?;

    let record = RunRecord::from_report(&args.task.manifest, &args.task.syst, &report);
    record.write(&layout)?;

    println!("Jobs preparados: {}", report.jobs.len());
    println!("  scripts: {}", layout.scripts_dir().display());
    println!("  envío:   {}", submit_path.display());
    for failure in &report.failures {
        eprintln!(
            "ERROR dataset {} variación \"{}\": {}",
            failure.dataset, failure.variation, failure.error
        );
    }

    Ok(report.is_success())
}

/* ==== harvest ==== */

/// Devuelve `false` si algún grupo falló.
pub async fn harvest(args: HarvestArgs) -> Result<bool> {
    let inputs = load_inputs(&args.task)?;
    let layout = TaskLayout::new(&args.task.task_dir);
    layout.create_merged_dir()?;

    let groups = load_groups(args.groups.as_deref(), &inputs.install_dir)?;

    let mut options = HarvestOptions::new(layout.output_dir(), layout.merged_dir());
    options.request = args.task.syst.clone();
    options.select = select_options(&args.task);
    options.prefix = args.task.prefix.clone();
    options.tree_analysis = args.tree_analysis;
    if args.check_complete {
        options.check_complete = Some(planner_config(&args.task));
    }

    let plan = plan_harvest(&inputs.datasets, &inputs.catalog, &groups, &options)?;
    let report = harvester::harvest(
        plan,
        Arc::new(Hadd::new(args.merge_tool)),
        default_merge_concurrency(),
    )
    .await;

    println!("Archivos combinados: {}", report.merged.len());
    for path in &report.merged {
        println!("  {}", path.display());
    }
    for failure in &report.failures {
        eprintln!(
            "ERROR grupo {} variación \"{}\": {}",
            failure.group, failure.variation, failure.error
        );
    }
    if !report.is_success() {
        eprintln!("Grupos con errores: {}", report.failed_groups().join(", "));
    }

    Ok(report.is_success())
}

/// Un archivo dado explícitamente tiene que existir; el de la instalación
/// es opcional.
fn load_groups(explicit: Option<&Path>, install_dir: &Path) -> Result<DatasetGroups> {
    if let Some(path) = explicit {
        return DatasetGroups::load(path)
            .with_context(|| format!("no se pudieron cargar los grupos {}", path.display()));
    }

    let default = install_dir.join("config").join("dataset_groups.yaml");
    if default.is_file() {
        DatasetGroups::load(&default)
            .with_context(|| format!("no se pudieron cargar los grupos {}", default.display()))
    } else {
        info!("sin {}: cada dataset es su propio grupo", default.display());
        Ok(DatasetGroups::default())
    }
}
