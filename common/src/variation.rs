use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::Path,
};

use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// Máscara que selecciona todos los datasets de simulación.
pub const WILDCARD_MASK: &str = "*";

/// Etiqueta sintética del pase que combina todas las variaciones de pesos.
pub const WEIGHTS_LABEL: &str = "weights";

/// Entrada del catálogo de variaciones sistemáticas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationEntry {
    pub masks: BTreeSet<String>,
    /// Variación implementada sólo con pesos alternativos.
    #[serde(default)]
    pub is_weight_only: bool,
}

impl VariationEntry {
    /// Sólo la simulación se ve afectada; los datos reales nunca.
    pub fn affects(&self, dataset: &Dataset) -> bool {
        dataset.is_sim
            && (self.masks.contains(WILDCARD_MASK)
                || self.masks.iter().any(|mask| dataset.name.contains(mask.as_str())))
    }
}

/// Formas aceptadas en el YAML: lista de máscaras, una sola máscara o la entrada completa.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Many(Vec<String>),
    Single(String),
    Full(VariationEntry),
}

impl From<RawEntry> for VariationEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Many(masks) => VariationEntry {
                masks: masks.into_iter().collect(),
                is_weight_only: false,
            },
            RawEntry::Single(mask) => VariationEntry {
                masks: BTreeSet::from([mask]),
                is_weight_only: false,
            },
            RawEntry::Full(entry) => entry,
        }
    }
}

/// Registro de variaciones indexado por stem (sin sufijo `_up`/`_down`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationCatalog {
    entries: BTreeMap<String, VariationEntry>,
}

impl VariationCatalog {
    pub fn new(entries: BTreeMap<String, VariationEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, stem: &str) -> Option<&VariationEntry> {
        self.entries.get(stem)
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.entries.contains_key(stem)
    }

    /// Entradas en orden alfabético de stem.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariationEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lee el catálogo de variaciones (`config/syst.yaml`).
///
/// Un archivo ausente o ilegible es un error de configuración.
pub fn load_catalog(path: &Path) -> Result<VariationCatalog> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config(path, format!("no se pudo leer el catálogo: {e}")))?;
    let raw: BTreeMap<String, RawEntry> =
        serde_yaml::from_str(&text).map_err(|e| Error::config(path, e.to_string()))?;

    let mut entries = BTreeMap::new();
    for (stem, entry) in raw {
        if split_label(&stem).1.is_some() {
            return Err(Error::config(
                path,
                format!("el stem \"{stem}\" no debe llevar sufijo _up/_down"),
            ));
        }
        let entry = VariationEntry::from(entry);
        if entry.masks.is_empty() {
            return Err(Error::config(path, format!("el stem \"{stem}\" no tiene máscaras")));
        }
        entries.insert(stem, entry);
    }

    Ok(VariationCatalog { entries })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Up, Direction::Down];

    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Separa `jec_up` en (`jec`, Some(Up)). Sin sufijo devuelve la etiqueta entera.
pub fn split_label(label: &str) -> (&str, Option<Direction>) {
    for direction in Direction::BOTH {
        if let Some(stem) = label.strip_suffix(direction.suffix()) {
            if let Some(stem) = stem.strip_suffix('_') {
                if !stem.is_empty() {
                    return (stem, Some(direction));
                }
            }
        }
    }
    (label, None)
}

/// Configuración concreta que procesa un job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variation {
    Nominal,
    /// Pase único con todas las variaciones de pesos.
    Weights,
    Shift { stem: String, direction: Direction },
}

impl Variation {
    pub fn shift(stem: impl Into<String>, direction: Direction) -> Self {
        Variation::Shift {
            stem: stem.into(),
            direction,
        }
    }

    /// `""`, `"weights"` o `"<stem>_<up|down>"`.
    pub fn label(&self) -> String {
        match self {
            Variation::Nominal => String::new(),
            Variation::Weights => WEIGHTS_LABEL.to_string(),
            Variation::Shift { stem, direction } => format!("{stem}_{}", direction.suffix()),
        }
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self, Variation::Nominal)
    }

    /// Sufijo para nombres de archivo: vacío para el nominal, `_<label>` si no.
    pub fn file_suffix(&self) -> String {
        match self {
            Variation::Nominal => String::new(),
            other => format!("_{}", other.label()),
        }
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variation::Nominal => write!(f, "nominal"),
            other => write!(f, "{}", other.label()),
        }
    }
}
