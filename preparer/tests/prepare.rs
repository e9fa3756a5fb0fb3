use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use common::{
    Dataset, Error, ParamValue, PlannerConfig, Result, SelectOptions, TaskLayout, VariationCatalog,
    VariationEntry,
};
use preparer::{prepare, PrepareOptions, ResourceSpec, ScriptOptions, SubmitScript, Submitter};

/// Guarda los scripts enviados en vez de llamar a qsub.
#[derive(Default)]
struct RecordingSubmitter {
    submitted: Mutex<Vec<(PathBuf, ResourceSpec)>>,
}

impl RecordingSubmitter {
    fn scripts(&self) -> Vec<PathBuf> {
        let mut scripts: Vec<PathBuf> = self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect();
        scripts.sort();
        scripts
    }
}

impl Submitter for RecordingSubmitter {
    fn submit(&self, script_path: &Path, resources: &ResourceSpec) -> Result<()> {
        self.submitted
            .lock()
            .unwrap()
            .push((script_path.to_path_buf(), resources.clone()));
        Ok(())
    }
}

fn dataset(name: &str, is_sim: bool, files: usize) -> Arc<Dataset> {
    Arc::new(Dataset {
        path: PathBuf::from(format!("/ddf/{name}.yaml")),
        name: name.to_string(),
        is_sim,
        files: (0..files).map(|i| format!("/store/{name}/f{i}.root")).collect(),
        parameters: BTreeMap::new(),
    })
}

fn catalog() -> VariationCatalog {
    VariationCatalog::new(BTreeMap::from([
        (
            "jec".to_string(),
            VariationEntry {
                masks: ["*".to_string()].into(),
                is_weight_only: false,
            },
        ),
        (
            "pdf".to_string(),
            VariationEntry {
                masks: ["TT".to_string()].into(),
                is_weight_only: true,
            },
        ),
    ]))
}

fn options(root: &Path, request: &str) -> PrepareOptions {
    let layout = TaskLayout::new(root.join("task"));
    PrepareOptions {
        request: request.to_string(),
        select: SelectOptions {
            skip_nominal: false,
            combine_weights: true,
        },
        planner: PlannerConfig::default(),
        script: ScriptOptions::new(layout, "/opt/hzz", "2016.yaml"),
        concurrency: 3,
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn nominal_prepara_un_job_por_dataset_pequeno() {
    let tmp = tempfile::tempdir().unwrap();
    let datasets = vec![dataset("Data", false, 3), dataset("TT", true, 10)];
    let submitter = Arc::new(RecordingSubmitter::default());

    let report = prepare(&datasets, &catalog(), options(tmp.path(), ""), submitter.clone())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(
        file_names(&submitter.scripts()),
        vec!["runOnBatch_Data_0.sh", "runOnBatch_TT_0.sh"]
    );

    let layout = TaskLayout::new(tmp.path().join("task"));
    assert!(layout.output_dir().is_dir());
    assert!(layout.logs_dir().is_dir());
    let tt = fs::read_to_string(layout.scripts_dir().join("runOnBatch_TT_0.sh")).unwrap();
    assert!(tt.contains("--skip-files=0"));
    assert!(tt.contains("--max-files=25"));
}

#[tokio::test]
async fn all_combina_pesos_y_parte_por_eventos() {
    let tmp = tempfile::tempdir().unwrap();
    let mut tt = (*dataset("TT", true, 100)).clone();
    tt.parameters
        .insert("num_selected_events".to_string(), ParamValue::Int(2_100_000));
    let datasets = vec![dataset("Data", false, 3), Arc::new(tt)];
    let submitter = Arc::new(RecordingSubmitter::default());

    let report = prepare(&datasets, &catalog(), options(tmp.path(), "all"), submitter.clone())
        .await
        .unwrap();

    assert!(report.is_success());
    // Data nominal (1) + TT weights (5) + TT jec up/down (5 + 5); pdf va en weights
    assert_eq!(report.jobs.len(), 16);
    let names = file_names(&submitter.scripts());
    assert!(names.contains(&"runOnBatch_TT_weights_4.sh".to_string()));
    assert!(names.contains(&"runOnBatch_TT_jec_down_0.sh".to_string()));
    assert!(!names.iter().any(|n| n.contains("pdf")));
    assert!(!names.iter().any(|n| n.contains("Data_jec")));
}

#[tokio::test]
async fn familia_atomica_sin_combinar_pesos_da_un_job() {
    let tmp = tempfile::tempdir().unwrap();
    let datasets = vec![dataset("TT", true, 300)];
    let submitter = Arc::new(RecordingSubmitter::default());
    let mut opts = options(tmp.path(), "pdf");
    opts.select.combine_weights = false;

    let report = prepare(&datasets, &catalog(), opts, submitter.clone())
        .await
        .unwrap();

    assert_eq!(
        file_names(&submitter.scripts()),
        vec!["runOnBatch_TT_pdf_down_0.sh", "runOnBatch_TT_pdf_up_0.sh"]
    );
    let text = fs::read_to_string(&report.jobs[0].script_path).unwrap();
    assert!(text.contains("--max-files=-1"));
}

#[tokio::test]
async fn dataset_vacio_falla_sin_afectar_a_los_demas() {
    let tmp = tempfile::tempdir().unwrap();
    let datasets = vec![
        dataset("TT", true, 10),
        dataset("Empty", true, 0),
        dataset("DY", true, 30),
    ];
    let submitter = Arc::new(RecordingSubmitter::default());

    let report = prepare(&datasets, &catalog(), options(tmp.path(), ""), submitter.clone())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].dataset, "Empty");
    assert!(matches!(
        report.failures[0].error,
        Error::EmptyDataset { ref dataset } if dataset == "Empty"
    ));
    assert_eq!(
        file_names(&submitter.scripts()),
        vec!["runOnBatch_DY_0.sh", "runOnBatch_DY_1.sh", "runOnBatch_TT_0.sh"]
    );
}

#[tokio::test]
async fn peticion_desconocida_aborta_antes_de_crear_nada() {
    let tmp = tempfile::tempdir().unwrap();
    let datasets = vec![dataset("TT", true, 10)];
    let submitter = Arc::new(RecordingSubmitter::default());

    let err = prepare(&datasets, &catalog(), options(tmp.path(), "jes"), submitter.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownVariation { .. }));
    assert!(submitter.scripts().is_empty());
    assert!(!tmp.path().join("task").exists());
}

#[tokio::test]
async fn send_jobs_recibe_una_linea_por_job() {
    let tmp = tempfile::tempdir().unwrap();
    let datasets = vec![dataset("TT", true, 60), dataset("DY", true, 30)];
    let opts = options(tmp.path(), "jec_up");
    let layout = opts.script.layout.clone();
    layout.create_job_dirs().unwrap();
    let submitter = Arc::new(SubmitScript::open(&layout).unwrap());

    let report = prepare(&datasets, &catalog(), opts, submitter).await.unwrap();
    assert_eq!(report.jobs.len(), 3 + 2);

    let text = fs::read_to_string(layout.submit_script()).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort();
    let mut expected: Vec<String> = report.jobs.iter().map(|j| j.submit_command.clone()).collect();
    expected.sort();
    assert_eq!(lines, expected);
}
