// src/export/mod.rs
use rayon::prelude::*;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::table::Tabular;

pub mod csv;
pub mod parquet;
pub mod workbook;

pub use self::csv::write_csv;
pub use self::parquet::write_parquet;
pub use self::workbook::write_workbook;

pub const WORKBOOK_FILE: &str = "reporte_covid.xlsx";
pub const SHEET_PROCESSED: &str = "datos_procesados";
pub const SHEET_INCIDENCE: &str = "metrica_incidencia_7d";
pub const SHEET_GROWTH: &str = "metrica_factor_crec_7d";
pub const PROFILE_FILE: &str = "tabla_perfilado.csv";

/// Every file one export wrote, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportDescriptor {
    pub root: PathBuf,
    pub workbook: PathBuf,
    pub csv: BTreeMap<String, PathBuf>,
    pub parquet: BTreeMap<String, PathBuf>,
}

impl ExportDescriptor {
    pub fn paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.workbook.clone())
            .chain(self.csv.values().cloned())
            .chain(self.parquet.values().cloned())
            .collect()
    }
}

pub(crate) fn write_err(path: &Path, e: impl Display) -> PipelineError {
    PipelineError::ExportWriteError {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Write the processing table as `datos_procesados` and each named metric
/// table under `destination`: one workbook sheet, one CSV and one parquet
/// file per table. `destination` is created if absent.
#[instrument(level = "info", skip(processing, metrics), fields(root = %destination.display()))]
pub fn export(
    processing: &dyn Tabular,
    metrics: &[(&str, &dyn Tabular)],
    destination: &Path,
) -> Result<ExportDescriptor> {
    fs::create_dir_all(destination).map_err(|e| write_err(destination, e))?;

    let mut tables: Vec<(&str, &dyn Tabular)> = vec![(SHEET_PROCESSED, processing)];
    tables.extend_from_slice(metrics);

    let written = tables
        .par_iter()
        .map(|(name, table)| -> Result<(String, PathBuf, PathBuf)> {
            let csv_path = destination.join(format!("{}.csv", name));
            write_csv(*table, &csv_path)?;
            let parquet_path = destination.join(format!("{}.parquet", name));
            write_parquet(*table, &parquet_path)?;
            Ok((name.to_string(), csv_path, parquet_path))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut descriptor = ExportDescriptor {
        root: destination.to_path_buf(),
        workbook: destination.join(WORKBOOK_FILE),
        ..Default::default()
    };
    for (name, csv_path, parquet_path) in written {
        descriptor.csv.insert(name.clone(), csv_path);
        descriptor.parquet.insert(name, parquet_path);
    }
    write_workbook(&tables, &descriptor.workbook)?;

    info!(files = descriptor.paths().len(), "export complete");
    Ok(descriptor)
}
