use std::{io, path::PathBuf};

use thiserror::Error;

/// Errores del orquestador de jobs.
///
/// Las variantes que afectan a un solo dataset, grupo o job se acumulan en
/// los reportes de `preparer` y `harvester`; el resto aborta la operación.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuración de datasets o variaciones mal formada o incompleta.
    #[error("configuración inválida en \"{}\": {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error(
        "variación sistemática \"{request}\" no reconocida \
         (formas válidas: \"\", \"no\", \"weights\", \"all\", <stem>, <stem>_up, <stem>_down)"
    )]
    UnknownVariation { request: String },

    #[error("el dataset \"{dataset}\" no tiene archivos de entrada")]
    EmptyDataset { dataset: String },

    #[error("ningún archivo coincide con \"{pattern}\"")]
    NoMatch { pattern: String },

    #[error("el destino \"{}\" ya existe y no se pidió sobreescribirlo", path.display())]
    AlreadyExists { path: PathBuf },

    /// Herramienta externa (hadd, submitter) que terminó con código != 0.
    #[error("{tool} terminó con código {}: {stderr_tail}", code.map_or("?".to_string(), |c| c.to_string()))]
    ExternalTool {
        tool: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("error de E/S en \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tarea interna abortada: {0}")]
    TaskAborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Para usar con `map_err`: `fs::read(p).map_err(Error::io(p))`.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
