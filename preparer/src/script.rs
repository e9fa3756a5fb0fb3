use std::{
    fs,
    path::{Path, PathBuf},
};

use common::{
    naming, save_dataset, Error, JobSpec, MaxFiles, Result, TaskLayout,
};
use tracing::debug;

use crate::submit::ResourceSpec;

const DEFAULT_PROG: &str = "runHZZanalysis";
const DEFAULT_COPY_COMMAND: &str = "cp";
/// Verbosidad de debug en batch: los logs sólo se miran si algo falla.
const BATCH_VERBOSITY: u8 = 2;

/// Todo lo que necesita el generador de scripts además del `JobSpec`.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Árbol de la tarea, con raíz absoluta.
    pub layout: TaskLayout,
    /// Directorio de instalación con `env.sh`.
    pub install_dir: PathBuf,
    /// Configuración maestra, se pasa tal cual al programa.
    pub config: String,
    pub prog: String,
    /// Argumentos extra para el programa, después de los estándar.
    pub prog_args: Vec<String>,
    pub prefix: String,
    pub extension: String,
    pub analysis: Option<String>,
    pub dd_photon: bool,
    /// Copiar los archivos de entrada al nodo antes de ejecutar.
    pub local_copy: bool,
    pub copy_command: String,
    pub resources: ResourceSpec,
}

impl ScriptOptions {
    pub fn new(layout: TaskLayout, install_dir: impl Into<PathBuf>, config: impl Into<String>) -> Self {
        Self {
            layout,
            install_dir: install_dir.into(),
            config: config.into(),
            prog: DEFAULT_PROG.to_string(),
            prog_args: Vec::new(),
            prefix: String::new(),
            extension: naming::DEFAULT_EXTENSION.to_string(),
            analysis: None,
            dd_photon: false,
            local_copy: false,
            copy_command: DEFAULT_COPY_COMMAND.to_string(),
            resources: ResourceSpec::default(),
        }
    }
}

/// Resultado de generar un job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedJob {
    /// `<name>[_<label>]_<index>`
    pub job_name: String,
    pub script_path: PathBuf,
    /// Archivo que el job deja en `<task>/output`.
    pub output_name: String,
    pub submit_command: String,
}

/// Escribe el script de un job y devuelve su línea de envío.
///
/// El contenido depende sólo del `JobSpec` y de las opciones; volver a
/// generar el mismo job sobreescribe el script con el mismo texto.
pub fn generate(job: &JobSpec, options: &ScriptOptions) -> Result<GeneratedJob> {
    let dataset = &job.dataset;
    let layout = &options.layout;
    let job_name = naming::job_name(&dataset.name, &job.variation, job.job_index);
    let output_name = naming::job_output_name(
        &options.prefix,
        &dataset.name,
        &job.variation,
        job.job_index,
        &options.extension,
    );

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("export INITDIR={}", quote(&options.install_dir.to_string_lossy(), dataset_path(job))?),
        "cd \"$INITDIR\"".to_string(),
        ". ./env.sh".to_string(),
        "cd -".to_string(),
        "if [ -d \"$TMPDIR\" ] ; then cd \"$TMPDIR\" ; fi".to_string(),
        "hostname".to_string(),
        "date".to_string(),
    ];

    // Con copia local el programa lee un catálogo filtrado con los nombres
    // locales, y el rango vuelve a empezar en 0. El nombre local lleva la
    // posición en el rango: dos entradas con el mismo basename no colisionan.
    let (catalog, skip_files, max_files) = if options.local_copy {
        let local_files: Vec<String> = job
            .files()
            .iter()
            .enumerate()
            .map(|(i, file)| local_name(i, file))
            .collect();
        for (file, local) in job.files().iter().zip(&local_files) {
            lines.push(format!(
                "{} {} {}",
                options.copy_command,
                quote(file, dataset_path(job))?,
                quote(local, dataset_path(job))?
            ));
        }
        let local = dataset.with_files(local_files);
        let catalog = layout
            .catalogs_dir()
            .join(format!("{}{job_name}.yaml", options.prefix));
        save_dataset(&local, &catalog)?;
        (catalog, 0, MaxFiles::All)
    } else {
        (dataset.path.clone(), job.skip_files, job.max_files)
    };

    let mut command = vec![
        options.prog.clone(),
        format!("--config={}", options.config),
        format!("--catalog={}", catalog.display()),
        format!("--output={output_name}"),
        format!("--skip-files={skip_files}"),
        format!("--max-files={max_files}"),
        "--max-events=-1".to_string(),
    ];
    command.extend(options.prog_args.iter().cloned());
    if let Some(analysis) = &options.analysis {
        command.push(format!("--analysis={analysis}"));
    }
    if !job.variation.is_nominal() {
        command.push(format!("--syst={}", job.variation.label()));
    }
    if options.dd_photon {
        command.push("--dd-photon".to_string());
    }
    command.push("-v".to_string());
    command.push(BATCH_VERBOSITY.to_string());

    let command = shlex::try_join(command.iter().map(String::as_str)).map_err(|e| {
        Error::config(dataset_path(job), format!("argumento no representable en shell: {e}"))
    })?;
    lines.push(format!("echo {command}"));
    lines.push(format!("{command} || exit $?"));
    lines.push(format!(
        "cp {} {}",
        quote(&output_name, dataset_path(job))?,
        quote(&layout.output_dir().to_string_lossy(), dataset_path(job))?
    ));

    let script_path = layout
        .scripts_dir()
        .join(format!("runOnBatch_{}{job_name}.sh", options.prefix));
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&script_path, text).map_err(Error::io(&script_path))?;
    make_executable(&script_path)?;

    debug!(
        "script {} (archivos {:?})",
        script_path.display(),
        job.file_range()
    );

    let submit_command = options
        .resources
        .submit_line(&script_path, &layout.logs_dir());

    Ok(GeneratedJob {
        job_name,
        script_path,
        output_name,
        submit_command,
    })
}

fn dataset_path(job: &JobSpec) -> &Path {
    &job.dataset.path
}

fn quote(word: &str, context: &Path) -> Result<String> {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .map_err(|e| Error::config(context, format!("\"{word}\" no representable en shell: {e}")))
}

/// Nombre del archivo tras copiarlo al directorio de trabajo:
/// `input_<posición>_<basename>`.
fn local_name(position: usize, file: &str) -> String {
    let base = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    format!("input_{position}_{base}")
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(Error::io(path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{load_dataset, Dataset, DatasetStems, Direction, Variation};
    use std::{collections::BTreeMap, sync::Arc};

    fn dataset(dir: &Path) -> Arc<Dataset> {
        Arc::new(Dataset {
            path: dir.join("ddf/TT.yaml"),
            name: "TT".to_string(),
            is_sim: true,
            files: (0..5).map(|i| format!("/store/mc/TT/f{i}.root")).collect(),
            parameters: BTreeMap::new(),
        })
    }

    fn options(root: &Path) -> ScriptOptions {
        let layout = TaskLayout::new(root.join("task"));
        layout.create_job_dirs().unwrap();
        let mut options = ScriptOptions::new(layout, "/opt/hzz", "2016.yaml");
        options.prefix = "out_".to_string();
        options
    }

    fn job(dataset: Arc<Dataset>, variation: Variation, job_index: usize) -> JobSpec {
        JobSpec {
            dataset,
            variation,
            job_index,
            skip_files: job_index * 2,
            max_files: MaxFiles::Count(2),
        }
    }

    /// Mismo quoting que el generador.
    fn sh(words: &[&str]) -> String {
        shlex::try_join(words.iter().copied()).unwrap()
    }

    #[test]
    fn genera_script_con_la_linea_de_comandos_del_programa() {
        let tmp = tempfile::tempdir().unwrap();
        let options = options(tmp.path());
        let spec = job(dataset(tmp.path()), Variation::shift("jec", Direction::Up), 1);

        let generated = generate(&spec, &options).unwrap();
        assert_eq!(generated.job_name, "TT_jec_up_1");
        assert_eq!(generated.output_name, "out_TT_jec_up_1.root");
        assert_eq!(
            generated.script_path,
            options.layout.scripts_dir().join("runOnBatch_out_TT_jec_up_1.sh")
        );

        let text = fs::read_to_string(&generated.script_path).unwrap();
        let catalog = format!("--catalog={}", tmp.path().join("ddf/TT.yaml").display());
        let expected = sh(&[
            "runHZZanalysis",
            "--config=2016.yaml",
            &catalog,
            "--output=out_TT_jec_up_1.root",
            "--skip-files=2",
            "--max-files=2",
            "--max-events=-1",
            "--syst=jec_up",
            "-v",
            "2",
        ]);
        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains("export INITDIR=/opt/hzz\ncd \"$INITDIR\"\n"));
        assert!(text.contains(". ./env.sh\n"));
        assert!(text.contains(&format!("echo {expected}\n")));
        assert!(text.contains(&format!("{expected} || exit $?\n")));
        assert!(text.contains(&format!(
            "cp out_TT_jec_up_1.root {}\n",
            options.layout.output_dir().display()
        )));
    }

    #[test]
    fn nominal_no_pasa_syst_y_anade_opciones() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options(tmp.path());
        options.analysis = Some("PhotonCR".to_string());
        options.dd_photon = true;
        options.prog_args = vec!["--extra".to_string()];
        let spec = job(dataset(tmp.path()), Variation::Nominal, 0);

        let generated = generate(&spec, &options).unwrap();
        let text = fs::read_to_string(&generated.script_path).unwrap();
        assert!(!text.contains("--syst"));
        assert!(text.contains(&sh(&[
            "--max-events=-1",
            "--extra",
            "--analysis=PhotonCR",
            "--dd-photon",
            "-v",
            "2",
        ])));
    }

    #[test]
    fn argumentos_con_espacios_van_entre_comillas() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options(tmp.path());
        options.prog_args = vec!["--label=a b".to_string()];
        let spec = job(dataset(tmp.path()), Variation::Nominal, 0);

        let generated = generate(&spec, &options).unwrap();
        let text = fs::read_to_string(&generated.script_path).unwrap();
        let quoted = sh(&["--label=a b"]);
        assert_ne!(quoted, "--label=a b");
        assert!(text.contains(&quoted));
    }

    #[test]
    fn submit_command_usa_los_recursos_pedidos() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options(tmp.path());
        options.resources = ResourceSpec::express();
        let spec = job(dataset(tmp.path()), Variation::Nominal, 2);

        let generated = generate(&spec, &options).unwrap();
        assert_eq!(
            generated.submit_command,
            format!(
                "qsub -q express -l walltime=00:30:00 -j oe -o {}/ {}",
                options.layout.logs_dir().display(),
                generated.script_path.display()
            )
        );
    }

    #[test]
    fn copia_local_escribe_catalogo_filtrado() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options(tmp.path());
        options.local_copy = true;
        options.copy_command = "dccp".to_string();
        let spec = job(dataset(tmp.path()), Variation::Nominal, 1);

        let generated = generate(&spec, &options).unwrap();
        let text = fs::read_to_string(&generated.script_path).unwrap();
        assert!(text.contains("dccp /store/mc/TT/f2.root input_0_f2.root\n"));
        assert!(text.contains("dccp /store/mc/TT/f3.root input_1_f3.root\n"));
        assert!(!text.contains("f4.root"));
        assert!(text.contains(&sh(&["--skip-files=0", "--max-files=-1"])));

        let catalog = options.layout.catalogs_dir().join("out_TT_1.yaml");
        assert!(text.contains(&sh(&[&format!("--catalog={}", catalog.display())])));
        let local = load_dataset(&catalog, &DatasetStems::default()).unwrap();
        assert_eq!(local.name, "TT");
        assert!(local.is_sim);
        assert_eq!(local.files, vec!["input_0_f2.root", "input_1_f3.root"]);
    }

    #[test]
    fn copia_local_no_colapsa_archivos_con_el_mismo_nombre() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options(tmp.path());
        options.local_copy = true;
        let dataset = Arc::new(Dataset {
            path: tmp.path().join("ddf/DY.yaml"),
            name: "DY".to_string(),
            is_sim: true,
            files: vec![
                "/store/0000/tree_1.root".to_string(),
                "/store/0001/tree_1.root".to_string(),
            ],
            parameters: BTreeMap::new(),
        });
        let spec = JobSpec {
            dataset,
            variation: Variation::Nominal,
            job_index: 0,
            skip_files: 0,
            max_files: MaxFiles::Count(2),
        };

        let generated = generate(&spec, &options).unwrap();
        let text = fs::read_to_string(&generated.script_path).unwrap();
        assert!(text.contains("cp /store/0000/tree_1.root input_0_tree_1.root\n"));
        assert!(text.contains("cp /store/0001/tree_1.root input_1_tree_1.root\n"));

        let catalog = options.layout.catalogs_dir().join("out_DY_0.yaml");
        let local = load_dataset(&catalog, &DatasetStems::default()).unwrap();
        assert_eq!(local.files, vec!["input_0_tree_1.root", "input_1_tree_1.root"]);
    }

    #[test]
    fn regenerar_da_el_mismo_script() {
        let tmp = tempfile::tempdir().unwrap();
        let options = options(tmp.path());
        let spec = job(dataset(tmp.path()), Variation::Weights, 0);

        let first = generate(&spec, &options).unwrap();
        let text = fs::read_to_string(&first.script_path).unwrap();
        let second = generate(&spec, &options).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second.script_path).unwrap(), text);
    }
}
