//! Esquema de nombres de los archivos que producen los jobs y el harvest.

use std::path::{Path, PathBuf};

use crate::variation::Variation;

pub const DEFAULT_EXTENSION: &str = "root";

/// Nombre del grupo al que van los datos reales.
pub const DATA_GROUP: &str = "Data";

/// Raíz común de las salidas de un (dataset, variación): `<prefix><name>[_<label>]`.
pub fn output_stem(prefix: &str, dataset_name: &str, variation: &Variation) -> String {
    format!("{prefix}{dataset_name}{}", variation.file_suffix())
}

/// Identificador del job sin prefijo: `<name>[_<label>]_<index>`.
pub fn job_name(dataset_name: &str, variation: &Variation, job_index: usize) -> String {
    format!("{dataset_name}{}_{job_index}", variation.file_suffix())
}

/// `<prefix><name>[_<label>]_<index>.<ext>`; único mientras lo sea el par
/// (variación, índice) dentro del dataset.
pub fn job_output_name(
    prefix: &str,
    dataset_name: &str,
    variation: &Variation,
    job_index: usize,
    extension: &str,
) -> String {
    format!(
        "{}_{job_index}.{extension}",
        output_stem(prefix, dataset_name, variation)
    )
}

/// `<merge_dir>/<prefix><group>[_<label>].<ext>`
pub fn merged_path(
    merge_dir: &Path,
    prefix: &str,
    group: &str,
    variation: &Variation,
    extension: &str,
) -> PathBuf {
    merge_dir.join(format!(
        "{}.{extension}",
        output_stem(prefix, group, variation)
    ))
}

/// `<merge_dir>/<prefix><group>_final.<ext>`
pub fn final_path(merge_dir: &Path, prefix: &str, group: &str, extension: &str) -> PathBuf {
    merge_dir.join(format!("{prefix}{group}_final.{extension}"))
}

/// Comprueba que `file_name` es `<stem>_<dígitos>.<ext>`.
pub fn is_job_output_of(file_name: &str, stem: &str, extension: &str) -> bool {
    file_name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(extension))
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::Direction;

    #[test]
    fn nombres_de_salida_de_jobs() {
        assert_eq!(
            job_output_name("out_", "TT", &Variation::Nominal, 3, "root"),
            "out_TT_3.root"
        );
        assert_eq!(
            job_output_name("", "TT", &Variation::shift("jec", Direction::Up), 0, "root"),
            "TT_jec_up_0.root"
        );
        assert_eq!(
            job_output_name("", "TT", &Variation::Weights, 12, "root"),
            "TT_weights_12.root"
        );
        assert_eq!(
            job_name("DY", &Variation::shift("pdf", Direction::Down), 0),
            "DY_pdf_down_0"
        );
    }

    #[test]
    fn rutas_de_merge() {
        let dir = Path::new("/task/merged");
        assert_eq!(
            merged_path(dir, "out_", "TT", &Variation::Nominal, "root"),
            PathBuf::from("/task/merged/out_TT.root")
        );
        assert_eq!(
            merged_path(dir, "", "Top", &Variation::shift("jec", Direction::Down), "root"),
            PathBuf::from("/task/merged/Top_jec_down.root")
        );
        assert_eq!(
            final_path(dir, "out_", DATA_GROUP, "root"),
            PathBuf::from("/task/merged/out_Data_final.root")
        );
    }

    #[test]
    fn is_job_output_of_exige_solo_digitos() {
        assert!(is_job_output_of("out_TT_0.root", "out_TT", "root"));
        assert!(is_job_output_of("out_TT_125.root", "out_TT", "root"));
        assert!(!is_job_output_of("out_TT_2L_0.root", "out_TT", "root"));
        assert!(!is_job_output_of("out_TT_jec_up_0.root", "out_TT", "root"));
        assert!(!is_job_output_of("out_TT_.root", "out_TT", "root"));
        assert!(!is_job_output_of("out_TT_1.txt", "out_TT", "root"));
    }
}
