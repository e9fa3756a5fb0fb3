use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::dataset::{load_dataset, Dataset, DatasetStems};
use crate::error::{Error, Result};

const CATALOG_PATH_DIRECTIVE: &str = "catalogPath";

/// Parte de la configuración maestra del análisis que usa el orquestador.
#[derive(Debug, Default, Deserialize)]
struct MasterConfig {
    /// Archivo con los stems, relativo al directorio de la configuración.
    dataset_stems: Option<String>,
}

/// Stems declarados por la configuración maestra (`dataset_stems`), o ninguno.
pub fn load_stems_from_config(config_path: &Path) -> Result<DatasetStems> {
    let text = fs::read_to_string(config_path).map_err(Error::io(config_path))?;
    let config: Option<MasterConfig> =
        serde_yaml::from_str(&text).map_err(|e| Error::config(config_path, e.to_string()))?;

    match config.and_then(|c| c.dataset_stems) {
        Some(stems_file) => {
            let base = config_path.parent().unwrap_or_else(|| Path::new(""));
            let stems_path = base.join(stems_file);
            debug!("leyendo stems de {}", stems_path.display());
            DatasetStems::load(&stems_path)
        }
        None => Ok(DatasetStems::default()),
    }
}

/// Rutas de definiciones listadas en un manifiesto.
///
/// Una por línea; se ignoran líneas vacías y comentarios `#`. La directiva
/// `catalogPath=<dir>` fija el directorio base de las rutas relativas que la
/// siguen. Las rutas relativas restantes (y un `catalogPath` relativo) se
/// resuelven respecto al directorio del manifiesto.
pub fn parse_manifest(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    let manifest_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut base = manifest_dir.clone();
    let mut out = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == CATALOG_PATH_DIRECTIVE {
                let dir = value.trim();
                if dir.is_empty() {
                    return Err(Error::config(path, "catalogPath vacío"));
                }
                base = manifest_dir.join(dir);
                info!("las definiciones están en {}", base.display());
                continue;
            }
        }

        out.push(base.join(line));
    }

    Ok(out)
}

/// Carga todos los datasets de un manifiesto, con los stems de la
/// configuración maestra si se da.
pub fn load_manifest(path: &Path, config: Option<&Path>) -> Result<Vec<Dataset>> {
    let stems = match config {
        Some(config) => load_stems_from_config(config)?,
        None => DatasetStems::default(),
    };
    load_manifest_with_stems(path, &stems)
}

/// Como [`load_manifest`], con stems ya cargados. Falla en la primera
/// definición inválida o si dos definiciones comparten nombre.
pub fn load_manifest_with_stems(path: &Path, stems: &DatasetStems) -> Result<Vec<Dataset>> {
    let mut datasets = Vec::new();
    let mut names: BTreeMap<String, PathBuf> = BTreeMap::new();

    for ddf in parse_manifest(path)? {
        let dataset = load_dataset(&ddf, stems)?;

        if let Some(previous) = names.insert(dataset.name.clone(), ddf.clone()) {
            return Err(Error::config(
                &ddf,
                format!(
                    "el nombre \"{}\" ya lo usa \"{}\"",
                    dataset.name,
                    previous.display()
                ),
            ));
        }

        debug!(
            "dataset {} ({}, {} archivos) desde {}",
            dataset.name,
            if dataset.is_sim { "mc" } else { "data" },
            dataset.files.len(),
            ddf.display()
        );
        datasets.push(dataset);
    }

    Ok(datasets)
}
