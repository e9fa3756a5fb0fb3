use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use common::{Error, Result, TaskLayout};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::prepare::PrepareReport;

/// Registro de una ejecución de `prepare-jobs`, en `jobs/runs/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub host: String,
    pub manifest: PathBuf,
    pub request: String,
    pub num_jobs: usize,
    pub failures: Vec<FailedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub dataset: String,
    pub variation: String,
    pub error: String,
}

impl RunRecord {
    pub fn from_report(manifest: &Path, request: &str, report: &PrepareReport) -> Self {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            host,
            manifest: manifest.to_path_buf(),
            request: request.to_string(),
            num_jobs: report.jobs.len(),
            failures: report
                .failures
                .iter()
                .map(|f| FailedItem {
                    dataset: f.dataset.clone(),
                    variation: f.variation.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }

    /// Escribe el registro y devuelve su ruta.
    pub fn write(&self, layout: &TaskLayout) -> Result<PathBuf> {
        let dir = layout.runs_dir();
        fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
        let path = dir.join(format!("{}.json", self.id));

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(&path, e.to_string()))?;
        fs::write(&path, json).map_err(Error::io(&path))?;

        info!("registro de la preparación en {}", path.display());
        Ok(path)
    }
}
