use std::{
    fmt,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use common::{Error, Result, TaskLayout};
use tracing::debug;

const SUBMIT_TOOL: &str = "qsub";
const DEFAULT_WALLTIME: &str = "01:00:00";
const EXPRESS_QUEUE: &str = "express";
const EXPRESS_WALLTIME: &str = "00:30:00";

/// Recursos pedidos al sistema de colas para cada job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub queue: Option<String>,
    pub walltime: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            queue: None,
            walltime: DEFAULT_WALLTIME.to_string(),
        }
    }
}

impl ResourceSpec {
    /// Cola rápida: pocos jobs cortos.
    pub fn express() -> Self {
        Self {
            queue: Some(EXPRESS_QUEUE.to_string()),
            walltime: EXPRESS_WALLTIME.to_string(),
        }
    }

    /// Línea de envío: `qsub <flags> -o <logs>/ <script>`.
    pub fn submit_line(&self, script_path: &Path, logs_dir: &Path) -> String {
        format!(
            "{SUBMIT_TOOL} {self} -o {}/ {}",
            logs_dir.display(),
            script_path.display()
        )
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(queue) = &self.queue {
            write!(f, "-q {queue} ")?;
        }
        write!(f, "-l walltime={} -j oe", self.walltime)
    }
}

/// Envía (o registra para enviar) el script de un job.
pub trait Submitter: Send + Sync {
    fn submit(&self, script_path: &Path, resources: &ResourceSpec) -> Result<()>;
}

/// Acumula los comandos de envío en `send_jobs.sh`; el usuario lo ejecuta
/// después de revisar los scripts.
///
/// Si el archivo ya existe se añaden líneas al final. Cada línea se escribe
/// completa bajo el mutex, así que no se mezclan líneas de hilos distintos.
pub struct SubmitScript {
    path: PathBuf,
    logs_dir: PathBuf,
    file: Mutex<File>,
}

impl SubmitScript {
    pub fn open(layout: &TaskLayout) -> Result<Self> {
        let path = layout.submit_script();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::io(&path))?;
        Ok(Self {
            path,
            logs_dir: layout.logs_dir(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Submitter for SubmitScript {
    fn submit(&self, script_path: &Path, resources: &ResourceSpec) -> Result<()> {
        let line = resources.submit_line(script_path, &self.logs_dir);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{line}").map_err(Error::io(&self.path))?;
        debug!("añadido a {}: {}", self.path.display(), line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, sync::Arc, thread};

    #[test]
    fn flags_por_defecto_y_express() {
        assert_eq!(ResourceSpec::default().to_string(), "-l walltime=01:00:00 -j oe");
        assert_eq!(
            ResourceSpec::express().to_string(),
            "-q express -l walltime=00:30:00 -j oe"
        );
    }

    #[test]
    fn submit_line_con_logs_y_script() {
        let line = ResourceSpec::default().submit_line(
            Path::new("/t/jobs/scripts/runOnBatch_TT_0.sh"),
            Path::new("/t/jobs/logs"),
        );
        assert_eq!(
            line,
            "qsub -l walltime=01:00:00 -j oe -o /t/jobs/logs/ /t/jobs/scripts/runOnBatch_TT_0.sh"
        );
    }

    #[test]
    fn submit_script_anade_al_final_sin_mezclar_lineas() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = TaskLayout::new(tmp.path());
        fs::write(layout.submit_script(), "# anterior\n").unwrap();

        let submitter = Arc::new(SubmitScript::open(&layout).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let submitter = Arc::clone(&submitter);
                thread::spawn(move || {
                    for j in 0..25 {
                        let script = PathBuf::from(format!("/s/job_{t}_{j}.sh"));
                        submitter.submit(&script, &ResourceSpec::default()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let text = fs::read_to_string(layout.submit_script()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# anterior");
        assert_eq!(lines.len(), 1 + 8 * 25);
        assert!(lines[1..]
            .iter()
            .all(|l| l.starts_with("qsub -l walltime=01:00:00 -j oe -o ") && l.ends_with(".sh")));
    }
}
