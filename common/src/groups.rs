use std::{collections::BTreeMap, fs, path::Path};

use crate::error::{Error, Result};
use crate::naming::DATA_GROUP;

/// Agrupación de datasets con el mismo rol físico (`config/dataset_groups.yaml`).
///
/// Un dataset que no está en ningún grupo forma su propio grupo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetGroups {
    group_of: BTreeMap<String, String>,
}

impl DatasetGroups {
    /// Lee un mapping `grupo: [dataset, ...]`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(Error::io(path))?;
        let defs: BTreeMap<String, Vec<String>> =
            serde_yaml::from_str(&text).map_err(|e| Error::config(path, e.to_string()))?;
        Self::from_definitions(defs).map_err(|message| Error::config(path, message))
    }

    /// El nombre `Data` queda reservado para el merge de los datos reales.
    pub fn from_definitions(defs: BTreeMap<String, Vec<String>>) -> std::result::Result<Self, String> {
        let mut group_of = BTreeMap::new();
        for (group, names) in defs {
            if group == DATA_GROUP {
                return Err(format!(
                    "el grupo \"{group}\" está reservado para los datos reales"
                ));
            }
            for name in names {
                if let Some(other) = group_of.insert(name.clone(), group.clone()) {
                    return Err(format!(
                        "el dataset \"{name}\" está en los grupos \"{other}\" y \"{group}\""
                    ));
                }
            }
        }
        Ok(Self { group_of })
    }

    pub fn group_of<'a>(&'a self, dataset_name: &'a str) -> &'a str {
        self.group_of
            .get(dataset_name)
            .map(String::as_str)
            .unwrap_or(dataset_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_of_devuelve_el_grupo_o_el_propio_nombre() {
        let groups = DatasetGroups::from_definitions(BTreeMap::from([(
            "Top".to_string(),
            vec!["TT".to_string(), "ST_tW".to_string()],
        )]))
        .unwrap();
        assert_eq!(groups.group_of("TT"), "Top");
        assert_eq!(groups.group_of("ST_tW"), "Top");
        assert_eq!(groups.group_of("DY"), "DY");
    }

    #[test]
    fn dataset_en_dos_grupos_es_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dataset_groups.yaml");
        fs::write(&path, "Top: [TT, ST]\nOther: [TT]\n").unwrap();
        let err = DatasetGroups::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("TT"));
    }

    #[test]
    fn grupo_llamado_data_es_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dataset_groups.yaml");
        fs::write(&path, "Data: [TT]
").unwrap();
        let err = DatasetGroups::load(&path).unwrap_err();
        match err {
            Error::Config { path: p, message } => {
                assert_eq!(p, path);
                assert!(message.contains("reservado"));
            }
            other => panic!("error inesperado: {other:?}"),
        }
    }
}
