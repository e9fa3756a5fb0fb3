use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hzz-jobs")]
#[command(about = "Prepara los jobs del análisis para el sistema de colas y combina sus salidas")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Genera un script por job y añade sus comandos de envío a <task>/send_jobs.sh
    PrepareJobs(PrepareArgs),
    /// Combina las salidas de los jobs en <task>/merged
    Harvest(HarvestArgs),
}

/// Opciones comunes a los dos subcomandos.
#[derive(Args, Debug)]
pub struct TaskArgs {
    /// Archivo con la lista de definiciones de datasets
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Directorio para los scripts y resultados de la tarea
    #[arg(short = 'd', long, default_value = "task")]
    pub task_dir: PathBuf,

    /// Configuración maestra del análisis, relativa a <install>/config
    #[arg(long, default_value = "2016.yaml")]
    pub config: String,

    /// Variación sistemática pedida o grupo de ellas ("", no, weights, all, <stem>, <stem>_up, <stem>_down)
    #[arg(long, default_value = "")]
    pub syst: String,

    /// Prefijo de los archivos de salida
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Procesar las variaciones de pesos en jobs propios en vez de en el pase "weights"
    #[arg(long)]
    pub split_weights: bool,

    /// Directorio de instalación (por defecto $HZZ2L2NU_BASE)
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Catálogo de variaciones (por defecto <install>/config/syst.yaml)
    #[arg(long, value_name = "FILE")]
    pub syst_config: Option<PathBuf>,

    /// Eventos objetivo por job
    #[arg(long, default_value_t = 500_000)]
    pub events_per_job: u64,
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    /// Argumentos extra para el programa; los estándar se añaden solos
    #[arg(value_name = "PROG_ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub prog_args: Vec<String>,

    /// Programa a ejecutar en cada job
    #[arg(long, default_value = "runHZZanalysis")]
    pub prog: String,

    /// Copiar los archivos de entrada al nodo antes de ejecutar
    #[arg(long)]
    pub local_copy: bool,

    /// Comando para la copia local
    #[arg(long, default_value = "cp")]
    pub copy_command: String,

    /// Enviar a la cola express (jobs cortos y pocos)
    #[arg(long)]
    pub express: bool,

    /// Análisis a ejecutar
    #[arg(long)]
    pub analysis: Option<String>,

    /// Fondo de fotones a partir de datos
    #[arg(long)]
    pub dd_photon: bool,
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    /// Análisis basado en árboles: sin merge final de variaciones
    #[arg(long)]
    pub tree_analysis: bool,

    /// Exigir todas las salidas planificadas en vez de lo que encuentre el glob
    #[arg(long)]
    pub check_complete: bool,

    /// Grupos de datasets (por defecto <install>/config/dataset_groups.yaml si existe)
    #[arg(long, value_name = "FILE")]
    pub groups: Option<PathBuf>,

    /// Herramienta de merge
    #[arg(long, default_value = "hadd")]
    pub merge_tool: String,
}
