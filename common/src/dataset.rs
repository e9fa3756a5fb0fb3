use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::{
    collections::BTreeMap,
    fmt,
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::error::{Error, Result};

/// Parámetro escalar libre de una definición de dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Valor numérico, si lo tiene (enteros y flotantes).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Conversión del formato de texto: entero, luego flotante, luego string.
    fn parse_legacy(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            ParamValue::Float(v)
        } else {
            ParamValue::Text(raw.to_string())
        }
    }

    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    fn to_yaml(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::from(*b),
            ParamValue::Int(v) => Value::from(*v),
            ParamValue::Float(v) => Value::from(*v),
            ParamValue::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            // {:?} conserva el ".0" y el valor se vuelve a leer como flotante
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Dataset lógico: nombre corto, tipo (datos / simulación) y archivos de entrada.
///
/// El orden de `files` importa: los jobs se definen por rangos posicionales.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Archivo de definición del que se construyó.
    pub path: PathBuf,
    pub name: String,
    pub is_sim: bool,
    pub files: Vec<String>,
    pub parameters: BTreeMap<String, ParamValue>,
}

impl Dataset {
    pub fn parameter(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    /// Copia del dataset con otra lista de archivos (p.ej. copias locales).
    pub fn with_files(&self, files: Vec<String>) -> Dataset {
        Dataset {
            files,
            ..self.clone()
        }
    }
}

/// Stems reutilizables para completar fragmentos de definición, indexados por nombre.
#[derive(Debug, Clone, Default)]
pub struct DatasetStems {
    stems: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DatasetStems {
    /// Lee una lista YAML de mappings, cada uno con su `name`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(Error::io(path))?;
        let list: Vec<BTreeMap<String, Value>> =
            serde_yaml::from_str(&text).map_err(|e| Error::config(path, e.to_string()))?;

        let mut stems = BTreeMap::new();
        for stem in list {
            let name = stem
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::config(path, "hay un stem sin \"name\""))?
                .to_string();
            stems.insert(name, stem);
        }
        Ok(Self { stems })
    }

    pub fn insert(&mut self, name: impl Into<String>, fields: BTreeMap<String, Value>) {
        self.stems.insert(name.into(), fields);
    }

    pub fn get(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.stems.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// Carga una definición de dataset.
///
/// Los archivos `.txt` usan el formato antiguo de catálogo; el resto se lee
/// como YAML. Un fragmento YAML con `stem` se completa con los campos del
/// stem correspondiente; los campos propios del fragmento tienen prioridad.
pub fn load_dataset(path: &Path, stems: &DatasetStems) -> Result<Dataset> {
    if is_legacy(path) {
        load_legacy(path)
    } else {
        load_yaml(path, stems)
    }
}

/// Guarda la definición completa (sin referencia a stem), en YAML o en el
/// formato antiguo según la extensión de `path`.
pub fn save_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let text = if is_legacy(path) {
        render_legacy(dataset)
    } else {
        render_yaml(dataset).map_err(|e| Error::config(path, e.to_string()))?
    };
    fs::write(path, text).map_err(Error::io(path))
}

fn is_legacy(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "txt")
}

/* =========================
   YAML
   ========================= */

fn load_yaml(path: &Path, stems: &DatasetStems) -> Result<Dataset> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    let mut raw: BTreeMap<String, Value> =
        serde_yaml::from_str(&text).map_err(|e| Error::config(path, e.to_string()))?;

    if let Some(stem_ref) = raw.remove("stem") {
        let stem_name = stem_ref
            .as_str()
            .ok_or_else(|| Error::config(path, "\"stem\" debe ser un string"))?;

        if stems.is_empty() {
            return Err(Error::config(
                path,
                format!("es un fragmento del stem \"{stem_name}\" pero no se proporcionaron stems"),
            ));
        }

        let stem = stems.get(stem_name).ok_or_else(|| {
            Error::config(path, format!("no se encontró el stem \"{stem_name}\""))
        })?;

        for (key, value) in stem {
            raw.entry(key.clone()).or_insert_with(|| value.clone());
        }
        raw.remove("stem");
    }

    let name = match raw.remove("name") {
        Some(Value::String(s)) => s,
        Some(_) => return Err(Error::config(path, "\"name\" debe ser un string")),
        None => return Err(missing(path, "name")),
    };

    let is_sim = match raw.remove("is_sim") {
        Some(Value::Bool(b)) => b,
        Some(_) => return Err(Error::config(path, "\"is_sim\" debe ser booleano")),
        None => return Err(missing(path, "is_sim")),
    };

    let files = match raw.remove("files") {
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::config(path, "\"files\" debe contener sólo strings"))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(Error::config(path, "\"files\" debe ser una lista")),
        None => return Err(missing(path, "files")),
    };

    let mut parameters = BTreeMap::new();
    for (key, value) in raw {
        let param = ParamValue::from_yaml(&value).ok_or_else(|| {
            Error::config(path, format!("el parámetro \"{key}\" no es escalar"))
        })?;
        parameters.insert(key, param);
    }

    Ok(Dataset {
        path: path.to_path_buf(),
        name,
        is_sim,
        files,
        parameters,
    })
}

fn missing(path: &Path, field: &str) -> Error {
    Error::config(path, format!("falta el parámetro obligatorio \"{field}\""))
}

fn render_yaml(dataset: &Dataset) -> std::result::Result<String, serde_yaml::Error> {
    let mut out: BTreeMap<String, Value> = dataset
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.to_yaml()))
        .collect();

    out.insert("name".to_string(), Value::from(dataset.name.clone()));
    out.insert("is_sim".to_string(), Value::from(dataset.is_sim));
    out.insert(
        "files".to_string(),
        Value::Sequence(dataset.files.iter().cloned().map(Value::from).collect()),
    );

    serde_yaml::to_string(&out)
}

/* =========================
   Formato antiguo (.txt)
   ========================= */

const DATA_TYPE_KEY: &str = "data type";

fn load_legacy(path: &Path) -> Result<Dataset> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = shorten_name(&file_name).ok_or_else(|| {
        Error::config(path, format!("nombre de catálogo inesperado \"{file_name}\""))
    })?;

    let text = fs::read_to_string(path).map_err(Error::io(path))?;

    let mut raw_params: BTreeMap<String, String> = BTreeMap::new();
    let mut files = Vec::new();
    let mut reading_header = true;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if reading_header {
            if let Some((key, value)) = parse_header_line(trimmed) {
                if let Some(old) = raw_params.insert(key.clone(), value.clone()) {
                    warn!(
                        "parámetro \"{}\" repetido en {}: se reemplaza \"{}\" por \"{}\"",
                        key,
                        path.display(),
                        old,
                        value
                    );
                }
                continue;
            }
            reading_header = false;
        }

        if trimmed.starts_with('#') {
            continue;
        }
        if let Some(file) = trimmed.split_whitespace().next() {
            files.push(file.to_string());
        }
    }

    let is_sim = match raw_params.remove(DATA_TYPE_KEY).as_deref() {
        Some("mc") => true,
        Some("data") => false,
        Some(other) => {
            return Err(Error::config(
                path,
                format!("valor ilegal \"{other}\" para \"{DATA_TYPE_KEY}\""),
            ))
        }
        None => return Err(missing(path, DATA_TYPE_KEY)),
    };

    let parameters = raw_params
        .into_iter()
        .map(|(k, v)| {
            let value = ParamValue::parse_legacy(&v);
            (k, value)
        })
        .collect();

    Ok(Dataset {
        path: path.to_path_buf(),
        name,
        is_sim,
        files,
        parameters,
    })
}

/// Línea de cabecera `* clave: valor` (o `# clave: valor`).
fn parse_header_line(line: &str) -> Option<(String, String)> {
    let rest = line
        .strip_prefix('*')
        .or_else(|| line.strip_prefix('#'))?;
    let (key, value) = rest.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

fn render_legacy(dataset: &Dataset) -> String {
    let mut out = String::new();
    for (key, value) in &dataset.parameters {
        out.push_str(&format!("* {key}: {value}\n"));
    }
    out.push_str(&format!(
        "* {DATA_TYPE_KEY}: {}\n\n",
        if dataset.is_sim { "mc" } else { "data" }
    ));
    for file in &dataset.files {
        out.push_str(file);
        out.push('\n');
    }
    out
}

/// Nombre corto a partir del nombre de archivo del catálogo antiguo.
///
/// `Bonzais-TT_TuneCUETP8M1_13TeV-powheg-MC_ALLPruner-v1.txt` -> `TT`:
/// se quita el prefijo hasta el primer `-`, el sufijo `-<algo>Pruner...`
/// y todo lo que siga a `_TuneCUETP8M1` o `_13TeV`.
pub fn shorten_name(file_name: &str) -> Option<String> {
    let (prefix, rest) = file_name.split_once('-')?;
    if prefix.is_empty() {
        return None;
    }

    let cut = rest
        .match_indices('-')
        .map(|(idx, _)| idx)
        .filter(|&idx| idx >= 1 && is_pruner_tail(&rest[idx + 1..]))
        .last()?;

    let name = &rest[..cut];
    let name = name.split("_TuneCUETP8M1").next().unwrap_or(name);
    let name = name.split("_13TeV").next().unwrap_or(name);
    Some(name.to_string())
}

/// `\w+Pruner.+`
fn is_pruner_tail(tail: &str) -> bool {
    const PRUNER: &str = "Pruner";
    tail.match_indices(PRUNER).any(|(pos, _)| {
        pos >= 1
            && tail[..pos].chars().all(|c| c.is_alphanumeric() || c == '_')
            && tail.len() > pos + PRUNER.len()
    })
}
