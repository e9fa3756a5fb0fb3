use std::{fmt, sync::Arc};

use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::selector::WorkItem;
use crate::variation::Variation;

const DEFAULT_ATOMIC_FAMILIES: [&str; 2] = ["pdf", "QCDscale"];
const DEFAULT_EVENTS_PER_JOB: u64 = 500_000;
const DEFAULT_FILES_PER_JOB: usize = 25;
const DEFAULT_EVENT_COUNT_PARAMETER: &str = "num_selected_events";

/// Parámetros de la partición en jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Subcadenas de etiqueta cuyas variaciones no se pueden partir.
    pub atomic_families: Vec<String>,
    /// Eventos objetivo por job; `None` desactiva el cálculo por eventos.
    pub events_per_job: Option<u64>,
    pub default_files_per_job: usize,
    /// Parámetro del dataset con el número estimado de eventos.
    pub event_count_parameter: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            atomic_families: DEFAULT_ATOMIC_FAMILIES.iter().map(|s| s.to_string()).collect(),
            events_per_job: Some(DEFAULT_EVENTS_PER_JOB),
            default_files_per_job: DEFAULT_FILES_PER_JOB,
            event_count_parameter: DEFAULT_EVENT_COUNT_PARAMETER.to_string(),
        }
    }
}

impl PlannerConfig {
    pub fn is_atomic(&self, variation: &Variation) -> bool {
        let label = variation.label();
        !label.is_empty()
            && self
                .atomic_families
                .iter()
                .any(|family| !family.is_empty() && label.contains(family.as_str()))
    }

    /// Archivos por job para un dataset con `num_files` archivos (>= 1).
    fn files_per_job(&self, dataset: &Dataset, num_files: usize) -> usize {
        let events = dataset
            .parameter(&self.event_count_parameter)
            .and_then(|v| v.as_f64())
            .filter(|e| e.is_finite() && *e >= 0.0);

        match (events, self.events_per_job) {
            (Some(events), Some(per_job)) if per_job > 0 => {
                let num_jobs = (events / per_job as f64).ceil().max(1.0) as usize;
                num_files.div_ceil(num_jobs).clamp(1, num_files)
            }
            _ => self.default_files_per_job.max(1),
        }
    }
}

/// Cuántos archivos procesa un job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFiles {
    /// Todos los restantes (`-1` en la línea de comandos).
    All,
    Count(usize),
}

impl fmt::Display for MaxFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFiles::All => write!(f, "-1"),
            MaxFiles::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Unidad de trabajo: un rango de archivos de un dataset con una variación.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub dataset: Arc<Dataset>,
    pub variation: Variation,
    /// Único dentro de (dataset, variación).
    pub job_index: usize,
    pub skip_files: usize,
    pub max_files: MaxFiles,
}

impl JobSpec {
    /// Rango efectivo `[inicio, fin)`, truncado al número de archivos.
    pub fn file_range(&self) -> std::ops::Range<usize> {
        let total = self.dataset.files.len();
        let start = self.skip_files.min(total);
        let end = match self.max_files {
            MaxFiles::All => total,
            MaxFiles::Count(n) => self.skip_files.saturating_add(n).min(total),
        };
        start..end
    }

    pub fn files(&self) -> &[String] {
        &self.dataset.files[self.file_range()]
    }
}

/// Parte un par (variación, dataset) en jobs que cubren cada archivo una sola vez.
///
/// Las variaciones de familias atómicas van en un único job sobre todo el
/// dataset. El último job puede pedir más archivos de los que quedan; quien
/// lo consume trunca el rango.
pub fn plan_jobs(item: &WorkItem, config: &PlannerConfig) -> Result<Vec<JobSpec>> {
    let dataset = &item.dataset;
    let num_files = dataset.files.len();

    if num_files == 0 {
        return Err(Error::EmptyDataset {
            dataset: dataset.name.clone(),
        });
    }

    if config.is_atomic(&item.variation) {
        debug!(
            "dataset {} variación {}: familia atómica, un solo job",
            dataset.name, item.variation
        );
        return Ok(vec![JobSpec {
            dataset: Arc::clone(dataset),
            variation: item.variation.clone(),
            job_index: 0,
            skip_files: 0,
            max_files: MaxFiles::All,
        }]);
    }

    let per_job = config.files_per_job(dataset, num_files);
    let num_jobs = num_files.div_ceil(per_job);

    debug!(
        "dataset {} variación {}: {} archivos, {} por job, {} jobs",
        dataset.name, item.variation, num_files, per_job, num_jobs
    );

    Ok((0..num_jobs)
        .map(|job_index| JobSpec {
            dataset: Arc::clone(dataset),
            variation: item.variation.clone(),
            job_index,
            skip_files: job_index * per_job,
            max_files: MaxFiles::Count(per_job),
        })
        .collect())
}
