use std::path::Path;

use super::write_err;
use crate::error::Result;
use crate::table::Tabular;

/// Header row plus one record per table row. Missing numbers are empty cells.
pub fn write_csv(table: &dyn Tabular, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_err(path, e))?;
    wtr.write_record(table.column_names())
        .map_err(|e| write_err(path, e))?;

    let width = table.schema().len();
    for row in 0..table.num_rows() {
        let record: Vec<String> = (0..width).map(|col| table.cell(row, col).render()).collect();
        wtr.write_record(&record).map_err(|e| write_err(path, e))?;
    }
    wtr.flush().map_err(|e| write_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::profile::{ProfileRow, ProfileTable};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_header_and_rows() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.csv");
        let table = ProfileTable {
            rows: vec![ProfileRow {
                section: "resumen".into(),
                metric: "min_date".into(),
                value: "2021-01-01".into(),
                notes: "".into(),
            }],
        };
        write_csv(&table, &path)?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "seccion,metro,valor,notas\nresumen,min_date,2021-01-01,\n"
        );
        Ok(())
    }

    #[test]
    fn unwritable_path_is_export_error() {
        let err = write_csv(&ProfileTable::default(), Path::new("/no/such/dir/t.csv")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PipelineError::ExportWriteError { .. }
        ));
    }
}
