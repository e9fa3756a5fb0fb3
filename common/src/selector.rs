use std::{collections::BTreeSet, sync::Arc};

use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::variation::{split_label, Direction, Variation, VariationCatalog, WEIGHTS_LABEL};

/// Par (variación, dataset) a procesar.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub variation: Variation,
    pub dataset: Arc<Dataset>,
}

impl WorkItem {
    pub fn new(variation: Variation, dataset: Arc<Dataset>) -> Self {
        Self { variation, dataset }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOptions {
    /// No emitir el pase nominal (ni el de pesos).
    pub skip_nominal: bool,
    /// Procesar las variaciones de sólo-pesos junto con el nominal, en un pase `"weights"`.
    pub combine_weights: bool,
}

/// Forma interpretada de la petición `--syst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Nominal,
    Weights,
    All,
    Pair(String),
    Single(String, Direction),
}

impl Request {
    /// Interpreta la petición en orden de precedencia; lo que no encaja es
    /// `UnknownVariation`.
    pub fn parse(request: &str, catalog: &VariationCatalog) -> Result<Self> {
        let request = request.trim();
        match request {
            "" | "no" => return Ok(Request::Nominal),
            WEIGHTS_LABEL => return Ok(Request::Weights),
            "all" => return Ok(Request::All),
            _ => {}
        }

        if catalog.contains(request) {
            return Ok(Request::Pair(request.to_string()));
        }

        match split_label(request) {
            (stem, Some(direction)) if catalog.contains(stem) => {
                Ok(Request::Single(stem.to_string(), direction))
            }
            _ => Err(Error::UnknownVariation {
                request: request.to_string(),
            }),
        }
    }

    /// Las peticiones nominal y de pesos no necesitan el catálogo.
    pub fn needs_catalog(request: &str) -> bool {
        !matches!(request.trim(), "" | "no" | WEIGHTS_LABEL)
    }

    /// Pide algo más que la configuración nominal.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Request::Nominal)
    }
}

/// Expande la petición de variaciones en pares (variación, dataset).
///
/// - `""`/`"no"`: pase nominal de todos los datasets.
/// - `"weights"`: pase `"weights"` de cada simulación.
/// - `"all"`: pase nominal (o `"weights"` si `combine_weights`) y, por cada
///   entrada del catálogo no absorbida por el pase de pesos, up y down de
///   cada simulación afectada.
/// - `<stem>`: up y down de las simulaciones afectadas.
/// - `<stem>_up` / `<stem>_down`: sólo esa dirección.
///
/// Los datos reales participan en el pase nominal con etiqueta vacía y
/// nunca en una variación. Ningún par se repite.
pub fn select(
    datasets: &[Arc<Dataset>],
    catalog: &VariationCatalog,
    request: &str,
    options: SelectOptions,
) -> Result<Vec<WorkItem>> {
    let parsed = Request::parse(request, catalog)?;
    let mut out = Vec::new();
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();

    let mut push = |variation: Variation, dataset: &Arc<Dataset>| {
        if seen.insert((variation.label(), dataset.name.clone())) {
            out.push(WorkItem::new(variation, Arc::clone(dataset)));
        }
    };

    let nominal_pass = |push: &mut dyn FnMut(Variation, &Arc<Dataset>), sim_variation: Variation| {
        for dataset in datasets {
            if dataset.is_sim {
                push(sim_variation.clone(), dataset);
            } else {
                push(Variation::Nominal, dataset);
            }
        }
    };

    match &parsed {
        Request::Nominal => {
            if !options.skip_nominal {
                nominal_pass(&mut push, Variation::Nominal);
            }
        }
        Request::Weights => {
            if !options.skip_nominal {
                nominal_pass(&mut push, Variation::Weights);
            }
        }
        Request::All => {
            if !options.skip_nominal {
                let sim_variation = if options.combine_weights {
                    Variation::Weights
                } else {
                    Variation::Nominal
                };
                nominal_pass(&mut push, sim_variation);
            }

            for (stem, entry) in catalog.iter() {
                if options.combine_weights && entry.is_weight_only {
                    continue;
                }
                for direction in Direction::BOTH {
                    for dataset in datasets.iter().filter(|d| entry.affects(d)) {
                        push(Variation::shift(stem, direction), dataset);
                    }
                }
            }
        }
        Request::Pair(stem) => {
            if let Some(entry) = catalog.get(stem) {
                for direction in Direction::BOTH {
                    for dataset in datasets.iter().filter(|d| entry.affects(d)) {
                        push(Variation::shift(stem.as_str(), direction), dataset);
                    }
                }
            }
        }
        Request::Single(stem, direction) => {
            if let Some(entry) = catalog.get(stem) {
                for dataset in datasets.iter().filter(|d| entry.affects(d)) {
                    push(Variation::shift(stem.as_str(), *direction), dataset);
                }
            }
        }
    }

    debug!(
        "petición \"{}\" expandida en {} pares (variación, dataset)",
        request,
        out.len()
    );
    Ok(out)
}
