use std::sync::Arc;

use common::{
    plan_jobs, select, Dataset, Error, PlannerConfig, Result, SelectOptions, VariationCatalog,
    WorkItem,
};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::script::{generate, GeneratedJob, ScriptOptions};
use crate::submit::Submitter;

pub const DEFAULT_PREPARE_CONCURRENCY: usize = 4;

/// Parámetros de una preparación completa.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Petición de variaciones (`--syst`).
    pub request: String,
    pub select: SelectOptions,
    pub planner: PlannerConfig,
    pub script: ScriptOptions,
    /// Pares (variación, dataset) preparados a la vez.
    pub concurrency: usize,
}

/// Fallo acotado a un par (variación, dataset).
#[derive(Debug)]
pub struct PrepareFailure {
    pub dataset: String,
    pub variation: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct PrepareReport {
    /// Jobs generados, en el orden de la selección.
    pub jobs: Vec<GeneratedJob>,
    pub failures: Vec<PrepareFailure>,
}

impl PrepareReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Selecciona, parte en jobs, genera los scripts y los envía.
///
/// Una petición de variaciones inválida o un árbol de tarea que no se puede
/// crear abortan antes de preparar nada. Los errores de un par (variación,
/// dataset), p.ej. un dataset sin archivos, quedan en el reporte y no
/// impiden preparar el resto.
pub async fn prepare(
    datasets: &[Arc<Dataset>],
    catalog: &VariationCatalog,
    options: PrepareOptions,
    submitter: Arc<dyn Submitter>,
) -> Result<PrepareReport> {
    let items = select(datasets, catalog, &options.request, options.select)?;
    options.script.layout.create_job_dirs()?;

    info!(
        "preparando {} pares (variación, dataset) con concurrencia {}",
        items.len(),
        options.concurrency
    );

    let sem = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let planner = Arc::new(options.planner);
    let script = Arc::new(options.script);

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let sem = sem.clone();
        let planner = planner.clone();
        let script = script.clone();
        let submitter = submitter.clone();
        let key = (item.dataset.name.clone(), item.variation.label());

        let handle = tokio::spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Err(Error::TaskAborted(e.to_string())),
            };

            // plan + escritura de scripts: E/S bloqueante
            match tokio::task::spawn_blocking(move || {
                prepare_item(&item, &planner, &script, submitter.as_ref())
            })
            .await
            {
                Ok(result) => result,
                Err(e) => Err(Error::TaskAborted(e.to_string())),
            }
        });
        handles.push((key, handle));
    }

    let mut report = PrepareReport::default();
    for ((dataset, variation), handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::TaskAborted(e.to_string())),
        };

        match result {
            Ok(jobs) => report.jobs.extend(jobs),
            Err(error) => {
                warn!(
                    "dataset {} variación \"{}\": {}",
                    dataset, variation, error
                );
                report.failures.push(PrepareFailure {
                    dataset,
                    variation,
                    error,
                });
            }
        }
    }

    info!(
        "{} jobs preparados, {} pares fallidos",
        report.jobs.len(),
        report.failures.len()
    );
    Ok(report)
}

fn prepare_item(
    item: &WorkItem,
    planner: &PlannerConfig,
    script: &ScriptOptions,
    submitter: &dyn Submitter,
) -> Result<Vec<GeneratedJob>> {
    let specs = plan_jobs(item, planner)?;
    info!(
        "dataset {} variación \"{}\": {} jobs",
        item.dataset.name,
        item.variation.label(),
        specs.len()
    );

    let mut jobs = Vec::with_capacity(specs.len());
    for spec in &specs {
        let job = generate(spec, script)?;
        submitter.submit(&job.script_path, &script.resources)?;
        jobs.push(job);
    }
    Ok(jobs)
}
