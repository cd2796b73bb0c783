use calamine::{Data, Reader, Xls, Xlsx};
use rust_xlsxwriter::{Format, Image, Workbook};
use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::catalog::SparePart;
use crate::error::Result;
use crate::payloads::{DEFAULT_PART_CATEGORY, SparePartForm};

/// File name offered for the spare-part catalog export.
pub const PARTS_EXPORT_FILE: &str = "Catalogo_Repuestos.xlsx";

/// Content type of `.xlsx` downloads.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const PARTS_COLUMNS: [(&str, f64); 7] = [
    ("#", 10.0),
    ("Imagen", 20.0),
    ("Nombre", 30.0),
    ("Código", 15.0),
    ("Modelo", 20.0),
    ("Categoría", 20.0),
    ("Descripción", 50.0),
];

const IMAGE_BOX_PX: f64 = 120.0;

/// Convert the spare-part list to XLSX format
///
/// Writes one row per part under a bold header, followed by a `TOTAL` row
/// with the number of parts. Rows are tall enough to show a thumbnail; parts
/// whose id is a key of `images` get that picture embedded in the `Imagen`
/// column, scaled to fit a 120 px box.
///
/// # Arguments
/// * `parts` - Parts to export, in display order
/// * `images` - Raw image bytes keyed by part id
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
///
/// # Errors
/// * Returns an error if the workbook cannot be assembled. An image that
///   cannot be decoded is logged and skipped instead.
pub fn parts_to_xlsx(parts: &[SparePart], images: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Repuestos")?;

    let bold = Format::new().set_bold();
    for (col, (header, width)) in PARTS_COLUMNS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, part) in parts.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.set_row_height(row, 90)?;
        worksheet.write_number(row, 0, (i + 1) as f64)?;
        worksheet.write_string(row, 2, &part.nombre)?;
        worksheet.write_string(row, 3, part.codigo.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 4, part.modelo.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 5, part.categoria.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 6, part.descripcion.as_deref().unwrap_or(""))?;

        if let Some(bytes) = images.get(&part.id) {
            match Image::new_from_buffer(bytes) {
                Ok(mut image) if image.width() > 0.0 && image.height() > 0.0 => {
                    let scale =
                        (IMAGE_BOX_PX / image.width()).min(IMAGE_BOX_PX / image.height());
                    image.set_scale_width(scale).set_scale_height(scale);
                    worksheet.insert_image(row, 1, &image)?;
                }
                Ok(_) => log::warn!("empty image for part {}, skipped", part.id),
                Err(e) => log::warn!("unreadable image for part {}: {}", part.id, e),
            }
        }
    }

    let total_row = (parts.len() + 1) as u32;
    worksheet.write_string_with_format(total_row, 0, "TOTAL", &bold)?;
    worksheet.write_number(total_row, 2, parts.len() as f64)?;

    Ok(workbook.save_to_buffer()?)
}

// Accepted spellings of each import column, first non-empty one wins.
const NOMBRE_ALIASES: [&str; 3] = ["Nombre", "NOMBRE", "nombre"];
const CATEGORIA_ALIASES: [&str; 4] = ["Categoría", "Categoria", "CATEGORIA", "categoria"];
const DESCRIPCION_ALIASES: [&str; 4] = ["Descripción", "Descripcion", "DESCRIPCION", "descripcion"];
const CODIGO_ALIASES: [&str; 4] = ["Código", "Codigo", "CODIGO", "codigo"];
const MODELO_ALIASES: [&str; 3] = ["Modelo", "MODELO", "modelo"];

/// First cell of the closing row written by [`parts_to_xlsx`].
const TOTAL_MARKER: &str = "TOTAL";

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Map raw rows to part forms using the header row.
///
/// Rows without a name and the export's `TOTAL` row are skipped; a missing
/// category becomes `Otros`.
fn parts_from_rows<I>(headers: &[String], rows: I) -> Vec<SparePartForm>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let headers: Vec<&str> = headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}'))
        .collect();
    let column = |aliases: &[&str]| -> Vec<usize> {
        aliases
            .iter()
            .filter_map(|alias| headers.iter().position(|h| h == alias))
            .collect()
    };
    let nombre = column(&NOMBRE_ALIASES);
    let categoria = column(&CATEGORIA_ALIASES);
    let descripcion = column(&DESCRIPCION_ALIASES);
    let codigo = column(&CODIGO_ALIASES);
    let modelo = column(&MODELO_ALIASES);

    let mut forms = Vec::new();
    for row in rows {
        if row.first().is_some_and(|cell| cell.trim() == TOTAL_MARKER) {
            continue;
        }
        let pick = |columns: &[usize]| -> String {
            columns
                .iter()
                .filter_map(|&i| row.get(i))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .unwrap_or("")
                .to_string()
        };

        let nombre = pick(&nombre);
        if nombre.is_empty() {
            continue;
        }
        let categoria = match pick(&categoria) {
            c if c.is_empty() => DEFAULT_PART_CATEGORY.to_string(),
            c => c,
        };
        forms.push(SparePartForm {
            nombre,
            categoria,
            descripcion: pick(&descripcion),
            codigo: pick(&codigo),
            modelo: pick(&modelo),
        });
    }
    forms
}

/// Parse a spare-part import file in CSV format
///
/// Column headers are matched against the Spanish spellings used by the
/// export (with or without accents, capitalised or upper/lower case).
///
/// # Arguments
/// * `input` - CSV content, header row first
///
/// # Returns
/// * `Result<Vec<SparePartForm>>` - One unvalidated form per usable row
pub fn parts_from_csv<R: Read>(input: R) -> Result<Vec<SparePartForm>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

    Ok(parts_from_rows(&headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Rows of the first worksheet, as text.
fn first_sheet_rows<'a, W>(bytes: &'a [u8]) -> Result<Vec<Vec<String>>>
where
    W: Reader<Cursor<&'a [u8]>>,
    calamine::Error: From<W::Error>,
{
    let mut workbook = W::new(Cursor::new(bytes)).map_err(calamine::Error::from)?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(calamine::Error::from)?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Parse a spare-part import workbook (`.xlsx` or legacy `.xls`)
///
/// Reads the first worksheet; its first row holds the headers. A workbook
/// written by [`parts_to_xlsx`] imports back as the same parts.
///
/// # Arguments
/// * `bytes` - Workbook file content
///
/// # Returns
/// * `Result<Vec<SparePartForm>>` - One unvalidated form per usable row
pub fn parts_from_workbook(bytes: &[u8]) -> Result<Vec<SparePartForm>> {
    let rows = if bytes.starts_with(XLS_MAGIC) {
        first_sheet_rows::<Xls<Cursor<&[u8]>>>(bytes)?
    } else {
        first_sheet_rows::<Xlsx<Cursor<&[u8]>>>(bytes)?
    };

    let mut rows = rows.into_iter();
    match rows.next() {
        Some(headers) => Ok(parts_from_rows(&headers, rows)),
        None => Ok(Vec::new()),
    }
}

/// Parse an uploaded import file, picking the reader from its content.
///
/// Zip and OLE containers are read as workbooks, anything else as CSV.
pub fn parts_from_upload(bytes: &[u8]) -> Result<Vec<SparePartForm>> {
    if bytes.starts_with(XLSX_MAGIC) || bytes.starts_with(XLS_MAGIC) {
        parts_from_workbook(bytes)
    } else {
        parts_from_csv(bytes)
    }
}
