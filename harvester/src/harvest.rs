use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
};

use common::{
    naming, plan_jobs, select, Dataset, DatasetGroups, Error, PlannerConfig, Request, Result,
    SelectOptions, Variation, VariationCatalog, WorkItem,
};
use sysinfo::{System, SystemExt};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::merge::{merge, Merger, Source};

/// Tamaño del pool de merges: `MERGE_CONCURRENCY` o el número de CPUs.
pub fn default_merge_concurrency() -> usize {
    let mut sys = System::new();
    sys.refresh_cpu();
    common::config::env_usize("MERGE_CONCURRENCY", sys.cpus().len().max(1))
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub request: String,
    pub select: SelectOptions,
    pub prefix: String,
    pub extension: String,
    /// Salidas de los jobs (`<task>/output`).
    pub source_dir: PathBuf,
    /// Resultados (`<task>/merged`).
    pub merge_dir: PathBuf,
    /// Sin merge final de todas las variaciones.
    pub tree_analysis: bool,
    /// Si se da, se esperan exactamente las salidas que planifica el
    /// planner, en vez de lo que encuentre el glob.
    pub check_complete: Option<PlannerConfig>,
    pub overwrite: bool,
}

impl HarvestOptions {
    pub fn new(source_dir: impl Into<PathBuf>, merge_dir: impl Into<PathBuf>) -> Self {
        Self {
            request: String::new(),
            select: SelectOptions::default(),
            prefix: String::new(),
            extension: naming::DEFAULT_EXTENSION.to_string(),
            source_dir: source_dir.into(),
            merge_dir: merge_dir.into(),
            tree_analysis: false,
            check_complete: None,
            overwrite: true,
        }
    }
}

/// Un merge concreto: fuentes de uno o varios datasets hacia un destino.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRule {
    pub group: String,
    /// `None` para el merge de todos los datos reales.
    pub variation: Option<Variation>,
    pub datasets: Vec<String>,
    pub sources: Vec<Source>,
    pub destination: PathBuf,
}

impl MergeRule {
    fn variation_label(&self) -> String {
        self.variation.as_ref().map(Variation::label).unwrap_or_default()
    }
}

/// Merges a ejecutar, en orden determinista.
#[derive(Debug, Default)]
pub struct HarvestPlan {
    pub data: Option<MergeRule>,
    /// Ordenadas por (grupo, variación).
    pub rules: Vec<MergeRule>,
    /// Destino del merge final por grupo, si se pide.
    pub finals: BTreeMap<String, PathBuf>,
    /// Reglas que no se pudieron construir.
    pub blocked: Vec<HarvestFailure>,
    pub overwrite: bool,
}

#[derive(Debug)]
pub struct HarvestFailure {
    pub group: String,
    pub variation: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct HarvestReport {
    /// Archivos escritos, ordenados.
    pub merged: Vec<PathBuf>,
    /// Ordenados por (grupo, variación).
    pub failures: Vec<HarvestFailure>,
}

impl HarvestReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Grupos con algún fallo, sin repetir.
    pub fn failed_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.failures.iter().map(|f| f.group.as_str()).collect();
        groups.dedup();
        groups
    }
}

/// Construye el plan de merges a partir de la misma selección que usó la
/// preparación de jobs.
///
/// Los datos reales se combinan todos en un solo archivo. Cada par
/// (variación, dataset) de simulación contribuye al merge de su grupo y
/// variación. Si la petición va más allá del nominal (y no es un análisis
/// de árboles) se añade un merge final por grupo.
pub fn plan_harvest(
    datasets: &[Arc<Dataset>],
    catalog: &VariationCatalog,
    groups: &DatasetGroups,
    options: &HarvestOptions,
) -> Result<HarvestPlan> {
    let request = Request::parse(&options.request, catalog)?;
    let with_finals = !request.is_trivial() && !options.tree_analysis;
    let mut plan = HarvestPlan {
        overwrite: options.overwrite,
        ..HarvestPlan::default()
    };

    /* ==== datos reales ==== */
    let mut data = MergeRule {
        group: naming::DATA_GROUP.to_string(),
        variation: None,
        datasets: Vec::new(),
        sources: Vec::new(),
        destination: if with_finals {
            naming::final_path(
                &options.merge_dir,
                &options.prefix,
                naming::DATA_GROUP,
                &options.extension,
            )
        } else {
            naming::merged_path(
                &options.merge_dir,
                &options.prefix,
                naming::DATA_GROUP,
                &Variation::Nominal,
                &options.extension,
            )
        },
    };
    let mut data_blocked = None;
    for dataset in datasets.iter().filter(|d| !d.is_sim) {
        let item = WorkItem::new(Variation::Nominal, Arc::clone(dataset));
        match sources_for(&item, options) {
            Ok(sources) => data.sources.extend(sources),
            Err(error) => {
                data_blocked.get_or_insert(error);
            }
        }
        data.datasets.push(dataset.name.clone());
    }
    match data_blocked {
        Some(error) => plan.blocked.push(HarvestFailure {
            group: data.group.clone(),
            variation: String::new(),
            error,
        }),
        None if !data.datasets.is_empty() => plan.data = Some(data),
        None => {}
    }

    /* ==== simulación, por (grupo, variación) ==== */
    let items = select(datasets, catalog, &options.request, options.select)?;
    let mut rules: BTreeMap<(String, Variation), MergeRule> = BTreeMap::new();
    let mut blocked: BTreeMap<(String, Variation), Error> = BTreeMap::new();

    for item in items.iter().filter(|i| i.dataset.is_sim) {
        let group = groups.group_of(&item.dataset.name).to_string();
        let key = (group.clone(), item.variation.clone());
        let rule = rules.entry(key.clone()).or_insert_with(|| MergeRule {
            destination: naming::merged_path(
                &options.merge_dir,
                &options.prefix,
                &group,
                &item.variation,
                &options.extension,
            ),
            group,
            variation: Some(item.variation.clone()),
            datasets: Vec::new(),
            sources: Vec::new(),
        });
        rule.datasets.push(item.dataset.name.clone());

        match sources_for(item, options) {
            Ok(sources) => rule.sources.extend(sources),
            Err(error) => {
                blocked.entry(key).or_insert(error);
            }
        }
    }

    for (key, error) in blocked {
        rules.remove(&key);
        plan.blocked.push(HarvestFailure {
            group: key.0,
            variation: key.1.label(),
            error,
        });
    }

    if with_finals {
        for (group, _) in rules.keys() {
            plan.finals.entry(group.clone()).or_insert_with(|| {
                naming::final_path(&options.merge_dir, &options.prefix, group, &options.extension)
            });
        }
        for failure in &plan.blocked {
            plan.finals.remove(&failure.group);
        }
    }

    plan.rules = rules.into_values().collect();
    Ok(plan)
}

/// Fuentes de un par (variación, dataset): el glob de sus salidas o, con
/// `check_complete`, la lista exacta de salidas planificadas.
fn sources_for(item: &WorkItem, options: &HarvestOptions) -> Result<Vec<Source>> {
    let dataset = &item.dataset;
    match &options.check_complete {
        None => Ok(vec![Source::job_outputs(
            &options.source_dir,
            naming::output_stem(&options.prefix, &dataset.name, &item.variation),
            options.extension.as_str(),
        )]),
        Some(planner) => Ok(plan_jobs(item, planner)?
            .iter()
            .map(|job| {
                Source::Path(options.source_dir.join(naming::job_output_name(
                    &options.prefix,
                    &dataset.name,
                    &job.variation,
                    job.job_index,
                    &options.extension,
                )))
            })
            .collect()),
    }
}

/// Resultado de ejecutar un merge en el pool.
type MergeOutcome = (String, String, Result<PathBuf>);

/// Ejecuta el plan con como mucho `concurrency` merges a la vez.
///
/// Los merges de grupos distintos no se esperan entre sí. El merge final de
/// un grupo empieza cuando terminan todos sus merges por variación, y sólo
/// si todos salieron bien.
pub async fn harvest(
    plan: HarvestPlan,
    merger: Arc<dyn Merger>,
    concurrency: usize,
) -> HarvestReport {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let overwrite = plan.overwrite;
    let mut report = HarvestReport {
        failures: plan.blocked,
        ..HarvestReport::default()
    };

    let mut by_group: BTreeMap<String, Vec<MergeRule>> = BTreeMap::new();
    for rule in plan.rules {
        by_group.entry(rule.group.clone()).or_default().push(rule);
    }
    let mut finals = plan.finals;

    let mut handles = Vec::new();

    if let Some(data) = plan.data {
        info!("merge de todos los datos ({})", data.datasets.join(", "));
        let sem = sem.clone();
        let merger = merger.clone();
        handles.push(tokio::spawn(async move {
            vec![run_rule(data, sem, merger, overwrite).await]
        }));
    }

    for (group, rules) in by_group {
        let final_destination = finals.remove(&group);
        let sem = sem.clone();
        let merger = merger.clone();

        // Barrera por grupo: el final espera sólo a sus propias variaciones.
        handles.push(tokio::spawn(async move {
            let variation_handles: Vec<_> = rules
                .into_iter()
                .map(|rule| {
                    info!(
                        "merge de {} variación \"{}\" ({})",
                        rule.group,
                        rule.variation_label(),
                        rule.datasets.join(", ")
                    );
                    tokio::spawn(run_rule(rule, sem.clone(), merger.clone(), overwrite))
                })
                .collect();

            let mut outcomes = Vec::with_capacity(variation_handles.len() + 1);
            for handle in variation_handles {
                outcomes.push(match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => (group.clone(), String::new(), Err(Error::TaskAborted(e.to_string()))),
                });
            }

            let Some(destination) = final_destination else {
                return outcomes;
            };
            if outcomes.iter().any(|(_, _, r)| r.is_err()) {
                warn!("grupo {}: hay merges fallidos, se omite el merge final", group);
                return outcomes;
            }

            let sources = outcomes
                .iter()
                .filter_map(|(_, _, r)| r.as_ref().ok())
                .map(|p| Source::Path(p.clone()))
                .collect();
            let final_rule = MergeRule {
                group: group.clone(),
                variation: None,
                datasets: Vec::new(),
                sources,
                destination,
            };
            info!("merge final del grupo {}", group);
            let mut outcome = run_rule(final_rule, sem, merger, overwrite).await;
            outcome.1 = "final".to_string();
            outcomes.push(outcome);
            outcomes
        }));
    }

    for handle in handles {
        let outcomes = match handle.await {
            Ok(outcomes) => outcomes,
            Err(e) => vec![(String::new(), String::new(), Err(Error::TaskAborted(e.to_string())))],
        };
        for (group, variation, result) in outcomes {
            match result {
                Ok(path) => report.merged.push(path),
                Err(error) => {
                    warn!("grupo {} variación \"{}\": {}", group, variation, error);
                    report.failures.push(HarvestFailure {
                        group,
                        variation,
                        error,
                    });
                }
            }
        }
    }

    report.merged.sort();
    report
        .failures
        .sort_by(|a, b| (&a.group, &a.variation).cmp(&(&b.group, &b.variation)));
    info!(
        "harvest terminado: {} archivos, {} fallos",
        report.merged.len(),
        report.failures.len()
    );
    report
}

async fn run_rule(
    rule: MergeRule,
    sem: Arc<Semaphore>,
    merger: Arc<dyn Merger>,
    overwrite: bool,
) -> MergeOutcome {
    let label = rule.variation_label();
    let group = rule.group.clone();

    let _permit = match sem.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (group, label, Err(Error::TaskAborted(e.to_string()))),
    };

    let result = tokio::task::spawn_blocking(move || {
        merge(&rule.sources, &rule.destination, overwrite, merger.as_ref())
            .map(|_| rule.destination)
    })
    .await;

    let result = match result {
        Ok(result) => result,
        Err(e) => Err(Error::TaskAborted(e.to_string())),
    };
    (group, label, result)
}
