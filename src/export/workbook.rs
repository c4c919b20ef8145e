use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};
use std::path::Path;

use super::write_err;
use crate::error::Result;
use crate::table::{Cell, Tabular};

fn fill_sheet(workbook: &mut Workbook, name: &str, table: &dyn Tabular) -> std::result::Result<(), XlsxError> {
    let header = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    let schema = table.schema();
    for (col, (title, _)) in schema.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, title, &header)?;
    }
    for row in 0..table.num_rows() {
        let r = row as u32 + 1;
        for col in 0..schema.len() {
            let c = col as u16;
            match table.cell(row, col) {
                Cell::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
                Cell::Number(Some(v)) => {
                    sheet.write_number(r, c, v)?;
                }
                Cell::Number(None) => {}
                Cell::Date(d) => {
                    let dt = ExcelDateTime::from_ymd(d.year() as u16, d.month() as u8, d.day() as u8)?;
                    sheet.write_datetime_with_format(r, c, &dt, &date)?;
                }
            }
        }
    }
    Ok(())
}

/// One worksheet per `(sheet name, table)`, in order.
pub fn write_workbook(sheets: &[(&str, &dyn Tabular)], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    for (name, table) in sheets {
        fill_sheet(&mut workbook, name, *table).map_err(|e| write_err(path, e))?;
    }
    workbook.save(path).map_err(|e| write_err(path, e))?;
    Ok(())
}
