use std::{
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};

use common::{naming, Error, Result};
use tracing::{debug, info};

pub const DEFAULT_MERGE_TOOL: &str = "hadd";
/// Líneas de stderr que se conservan cuando la herramienta falla.
const STDERR_TAIL_LINES: usize = 10;

/// Herramienta externa que combina N archivos en uno.
pub trait Merger: Send + Sync {
    /// `output` no existe cuando se llama.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// `hadd <output> <input1> <input2> ...`
#[derive(Debug, Clone)]
pub struct Hadd {
    program: String,
}

impl Hadd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Hadd {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_TOOL)
    }
}

impl Merger for Hadd {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        debug!("{} {} ({} entradas)", self.program, output.display(), inputs.len());

        let out = Command::new(&self.program)
            .arg(output)
            .args(inputs)
            .output()
            .map_err(Error::io(&self.program))?;

        if out.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: self.program.clone(),
                code: out.status.code(),
                stderr_tail: stderr_tail(&out.stderr),
            })
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Entrada de un merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Un archivo concreto que tiene que existir.
    Path(PathBuf),
    /// Patrón glob arbitrario.
    Glob(String),
    /// Salidas de los jobs `<dir>/<stem>_<dígitos>.<ext>`.
    JobOutputs {
        dir: PathBuf,
        stem: String,
        extension: String,
    },
}

impl Source {
    pub fn job_outputs(dir: impl Into<PathBuf>, stem: impl Into<String>, extension: impl Into<String>) -> Self {
        Source::JobOutputs {
            dir: dir.into(),
            stem: stem.into(),
            extension: extension.into(),
        }
    }

    /// Archivos que cumplen la fuente, ordenados. Vacío es `NoMatch`.
    pub fn expand(&self) -> Result<Vec<PathBuf>> {
        let mut found = match self {
            Source::Path(path) => {
                if path.is_file() {
                    vec![path.clone()]
                } else {
                    Vec::new()
                }
            }
            Source::Glob(pattern) => glob_paths(pattern)?,
            Source::JobOutputs {
                dir,
                stem,
                extension,
            } => {
                let pattern = self.to_string();
                debug!("buscando salidas de jobs con {} en {}", pattern, dir.display());
                glob_paths(&pattern)?
                    .into_iter()
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| naming::is_job_output_of(n, stem, extension))
                    })
                    .collect()
            }
        };

        if found.is_empty() {
            return Err(Error::NoMatch {
                pattern: self.to_string(),
            });
        }
        found.sort();
        Ok(found)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Glob(pattern) => write!(f, "{pattern}"),
            Source::JobOutputs {
                dir,
                stem,
                extension,
            } => write!(
                f,
                "{}/{}_[0-9]*.{}",
                glob::Pattern::escape(&dir.to_string_lossy()),
                glob::Pattern::escape(stem),
                glob::Pattern::escape(extension)
            ),
        }
    }
}

fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| Error::config(pattern, format!("patrón inválido: {e}")))?;

    let mut out = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => out.push(path),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(Error::Io {
                    path,
                    source: e.into_error(),
                });
            }
        }
    }
    Ok(out)
}

/// Combina todas las fuentes en `destination`.
///
/// Cada fuente tiene que aportar al menos un archivo. Con un solo archivo en
/// total se copia sin llamar a la herramienta. Devuelve cuántos archivos se
/// combinaron.
pub fn merge(
    sources: &[Source],
    destination: &Path,
    overwrite: bool,
    merger: &dyn Merger,
) -> Result<usize> {
    let mut inputs = Vec::new();
    for source in sources {
        inputs.extend(source.expand()?);
    }
    if inputs.is_empty() {
        // sin fuentes no hay nada que buscar
        return Err(Error::NoMatch {
            pattern: destination.display().to_string(),
        });
    }

    if destination.exists() {
        if !overwrite {
            return Err(Error::AlreadyExists {
                path: destination.to_path_buf(),
            });
        }
        fs::remove_file(destination).map_err(Error::io(destination))?;
    }

    if let [single] = inputs.as_slice() {
        fs::copy(single, destination).map_err(Error::io(destination))?;
    } else {
        merger.merge(&inputs, destination)?;
    }

    info!(
        "{} <- {} archivos",
        destination.display(),
        inputs.len()
    );
    Ok(inputs.len())
}
