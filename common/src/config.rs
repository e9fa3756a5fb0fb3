use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::error::{Error, Result};

/// Variable de entorno con el directorio de instalación del análisis.
pub const INSTALL_BASE_VAR: &str = "HZZ2L2NU_BASE";

/// Directorio de instalación: `HZZ2L2NU_BASE`.
pub fn install_base() -> Result<PathBuf> {
    env::var(INSTALL_BASE_VAR)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::config(
                INSTALL_BASE_VAR,
                "variable de entorno no definida (o usar --install-dir)",
            )
        })
}

/// Entero positivo desde una variable de entorno, con valor por defecto.
pub fn env_usize(var: &str, default: usize) -> usize {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

/// Árbol de directorios de una tarea.
///
/// ```text
/// <root>/output/         salidas copiadas por los jobs
/// <root>/merged/         resultados del harvest
/// <root>/jobs/scripts/   un script por job
/// <root>/jobs/logs/      logs del sistema de colas
/// <root>/jobs/catalogs/  definiciones filtradas para copia local
/// <root>/jobs/runs/      registro de cada preparación
/// <root>/send_jobs.sh    comandos de envío
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLayout {
    root: PathBuf,
}

impl TaskLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Igual que `new`, pero con la raíz absoluta: los scripts se ejecutan
    /// en otro directorio.
    pub fn absolute(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let abs = if root.is_absolute() {
            root.to_path_buf()
        } else {
            env::current_dir()
                .map_err(Error::io(root))?
                .join(root)
        };
        Ok(Self { root: abs })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.root.join("merged")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("jobs").join("scripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("jobs").join("logs")
    }

    pub fn catalogs_dir(&self) -> PathBuf {
        self.root.join("jobs").join("catalogs")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("jobs").join("runs")
    }

    pub fn submit_script(&self) -> PathBuf {
        self.root.join("send_jobs.sh")
    }

    /// Crea los directorios para preparar jobs.
    pub fn create_job_dirs(&self) -> Result<()> {
        if !self.root.exists() {
            info!("se creará el directorio de la tarea {}", self.root.display());
        }
        for dir in [
            self.output_dir(),
            self.scripts_dir(),
            self.logs_dir(),
            self.catalogs_dir(),
            self.runs_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
        }
        Ok(())
    }

    pub fn create_merged_dir(&self) -> Result<()> {
        let dir = self.merged_dir();
        if !dir.exists() {
            info!("se creará el directorio {}", dir.display());
        }
        fs::create_dir_all(&dir).map_err(Error::io(&dir))
    }
}
