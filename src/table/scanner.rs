//! Table detection and row-to-document extraction.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::error::ScanError;
use super::header::{HeaderKey, HeaderMap, HeaderMapper};
use super::parse::{
    format_date, format_date_time, parse_currency, split_numero, split_ruc_razon_social,
};
use crate::document::{Document, TableKind};
use crate::page::{PageAccessor, PageError, TableHandle, TableRow};

/// Minimum number of cells a data row must carry.
pub const MIN_ROW_CELLS: usize = 8;

/// In-place retries for a row whose read fails transiently.
pub const ROW_RETRY_LIMIT: u32 = 2;

/// Pause before re-reading a row.
const ROW_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Column holding the one-based logical row number.
const NUMBER_COLUMN: usize = 0;

/// Result of extracting one rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtraction {
    /// Documents sorted by logical row index.
    pub documents: Vec<Document>,
    /// Rows dropped because their content was malformed.
    pub skipped_rows: usize,
    /// Rows dropped after exhausting in-place retries.
    pub abandoned_rows: usize,
}

/// Reads documents out of the portal tables through a [`PageAccessor`].
#[derive(Clone)]
pub struct TableScanner {
    page: Arc<dyn PageAccessor>,
}

impl std::fmt::Debug for TableScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableScanner").finish_non_exhaustive()
    }
}

impl TableScanner {
    /// Creates a scanner over a page accessor.
    #[must_use]
    pub fn new(page: Arc<dyn PageAccessor>) -> Self {
        Self { page }
    }

    /// Probes for the received table, then the issued table.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Page`] if the accessor fails.
    #[instrument(skip(self))]
    pub async fn detect_table(&self) -> Result<Option<TableHandle>, ScanError> {
        for kind in TableKind::ALL {
            if let Some(handle) = self.page.find_table(kind).await? {
                debug!(kind = %kind, table = %handle.element_id, "detected documents table");
                return Ok(Some(handle));
            }
        }
        debug!("no documents table on page");
        Ok(None)
    }

    /// Reads the header row of a table and resolves its columns.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Page`] if the headers cannot be read.
    pub async fn header_map(&self, table: &TableHandle) -> Result<HeaderMap, ScanError> {
        let headers = self.page.header_cells(table).await?;
        Ok(HeaderMapper::map(&headers))
    }

    /// Extracts every row of the rendered page.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::IncompleteHeaderMap`] when a required column is
    /// unresolved, and [`ScanError::Page`] when the row count cannot be read.
    pub async fn extract_page(
        &self,
        table: &TableHandle,
        header_map: &HeaderMap,
        page_number: u32,
    ) -> Result<PageExtraction, ScanError> {
        self.extract_page_with_progress(table, header_map, page_number, |_| {})
            .await
    }

    /// Like [`extract_page`](Self::extract_page), calling `on_row` with the
    /// number of rows processed so far after each physical row.
    ///
    /// Rows are read strictly in order. A row that fails to read with a
    /// transient error is retried in place up to [`ROW_RETRY_LIMIT`] times.
    ///
    /// # Errors
    ///
    /// Same as [`extract_page`](Self::extract_page).
    #[instrument(skip(self, header_map, on_row), fields(table = %table.element_id))]
    pub async fn extract_page_with_progress<F>(
        &self,
        table: &TableHandle,
        header_map: &HeaderMap,
        page_number: u32,
        mut on_row: F,
    ) -> Result<PageExtraction, ScanError>
    where
        F: FnMut(usize) + Send,
    {
        let missing = header_map.missing();
        if !missing.is_empty() {
            warn!(missing = ?missing, "refusing to extract rows with incomplete header mapping");
            return Err(ScanError::IncompleteHeaderMap {
                table: table.element_id.clone(),
                missing,
            });
        }

        let row_count = self.page.row_count(table).await?;
        let mut extraction = PageExtraction::default();

        for physical in 0..row_count {
            match self.read_row_with_retry(table, physical).await {
                Ok((logical, row)) => {
                    match row_to_document(&row, header_map, table.kind, page_number, logical) {
                        Ok(document) => extraction.documents.push(document),
                        Err(reason) => {
                            warn!(physical, logical, %reason, "skipping malformed row");
                            extraction.skipped_rows += 1;
                        }
                    }
                }
                Err(error) => {
                    warn!(physical, error = %error, "abandoning unreadable row");
                    extraction.abandoned_rows += 1;
                }
            }
            on_row(physical + 1);
        }
        extraction.documents.sort_by_key(|document| document.row_index);

        debug!(
            page_number,
            documents = extraction.documents.len(),
            skipped = extraction.skipped_rows,
            abandoned = extraction.abandoned_rows,
            "extracted page"
        );
        Ok(extraction)
    }

    async fn read_row_with_retry(
        &self,
        table: &TableHandle,
        physical: usize,
    ) -> Result<(usize, TableRow), PageError> {
        let mut retries = 0u32;
        loop {
            match self.read_logical_row(table, physical).await {
                Ok(found) => return Ok(found),
                Err(error) if error.is_transient() && retries < ROW_RETRY_LIMIT => {
                    retries += 1;
                    debug!(physical, retries, error = %error, "retrying row read");
                    tokio::time::sleep(ROW_RETRY_DELAY).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Reads a physical row and re-locates the logical row it numbers.
    ///
    /// The host may render rows out of order, so the numbering cell is
    /// trusted over the physical position.
    async fn read_logical_row(
        &self,
        table: &TableHandle,
        physical: usize,
    ) -> Result<(usize, TableRow), PageError> {
        let row = self.page.row_at(table, physical).await?;

        let Some(logical) = row
            .cells
            .get(NUMBER_COLUMN)
            .and_then(|cell| parse_row_number(cell))
            .map(|number| number - 1)
        else {
            let logical = row
                .key
                .as_deref()
                .and_then(|key| key.parse().ok())
                .unwrap_or(physical);
            return Ok((logical, row));
        };

        let key = logical.to_string();
        if row.key.as_deref() == Some(key.as_str()) {
            return Ok((logical, row));
        }

        match self.page.row_by_key(table, &key).await? {
            Some(relocated) => Ok((logical, relocated)),
            None => Ok((logical, row)),
        }
    }
}

/// Parses a one-based row number, ignoring surrounding text.
fn parse_row_number(cell: &str) -> Option<usize> {
    let digits: String = cell.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<usize>().ok().filter(|n| *n >= 1)
}

fn row_to_document(
    row: &TableRow,
    header_map: &HeaderMap,
    kind: TableKind,
    page_number: u32,
    row_index: usize,
) -> Result<Document, String> {
    if row.cells.len() < MIN_ROW_CELLS {
        return Err(format!(
            "expected at least {MIN_ROW_CELLS} cells, found {}",
            row.cells.len()
        ));
    }
    if let Some(max) = header_map.max_column()
        && max >= row.cells.len()
    {
        return Err(format!(
            "mapped column {max} out of range for {} cells",
            row.cells.len()
        ));
    }

    let cell = |key: HeaderKey| mapped_cell(row, header_map, key);

    let (ruc, razon_social) = split_ruc_razon_social(cell(HeaderKey::RucRazonSocial));
    let numero = cell(HeaderKey::TipoSerie)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let parts = split_numero(&numero);
    let clave_acceso = cell(HeaderKey::ClaveAcceso).trim().to_string();

    if clave_acceso.is_empty() && numero.is_empty() {
        return Err("row has neither access key nor document number".to_string());
    }

    Ok(Document {
        id: Document::derive_id(&clave_acceso, page_number, row_index, &numero, &ruc),
        row_index,
        page_number,
        tipo_comprobante: parts.tipo_comprobante,
        serie: parts.serie,
        numero_comprobante: parts.numero_comprobante,
        numero,
        ruc,
        razon_social,
        clave_acceso,
        fecha_emision: format_date(cell(HeaderKey::FechaEmision)),
        fecha_autorizacion: format_date_time(cell(HeaderKey::FechaAutorizacion)),
        valor_sin_impuestos: parse_currency(cell(HeaderKey::ValorSinImpuestos)),
        iva: parse_currency(cell(HeaderKey::Iva)),
        importe_total: parse_currency(cell(HeaderKey::ImporteTotal)),
        table_kind: kind,
        xml_exists: None,
        pdf_exists: None,
    })
}

fn mapped_cell<'a>(row: &'a TableRow, header_map: &HeaderMap, key: HeaderKey) -> &'a str {
    header_map
        .get(key)
        .and_then(|column| row.cells.get(column))
        .map_or("", String::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn full_map() -> HeaderMap {
        HeaderMapper::map(&[
            "Nro",
            "RUC y Razón social emisor",
            "Tipo y serie de comprobante",
            "Clave de acceso",
            "Fecha y hora de autorización",
            "Fecha emisión",
            "Valor sin impuestos",
            "IVA",
            "Importe total",
        ])
    }

    fn cells(n: usize, clave: &str) -> Vec<String> {
        vec![
            n.to_string(),
            "1790012345001\nACME S.A.".to_string(),
            "Factura 001-002-000012345".to_string(),
            clave.to_string(),
            "05/03/2024 13:45:10".to_string(),
            "05/03/2024".to_string(),
            "1.000,00".to_string(),
            "150,00".to_string(),
            "1.150,00".to_string(),
        ]
    }

    #[test]
    fn test_row_to_document_converts_all_fields() {
        let row = TableRow::new(Some("0"), cells(1, "0503202401"));
        let doc = row_to_document(&row, &full_map(), TableKind::Received, 3, 0).unwrap();

        assert_eq!(doc.id, "0503202401");
        assert_eq!(doc.page_number, 3);
        assert_eq!(doc.ruc, "1790012345001");
        assert_eq!(doc.razon_social, "ACME S.A.");
        assert_eq!(doc.numero, "Factura 001-002-000012345");
        assert_eq!(doc.tipo_comprobante, "Factura");
        assert_eq!(doc.serie, "001-002");
        assert_eq!(doc.numero_comprobante, "000012345");
        assert_eq!(doc.fecha_emision, "2024-03-05");
        assert_eq!(doc.fecha_autorizacion, "2024-03-05 13:45:10");
        assert!((doc.valor_sin_impuestos - 1000.0).abs() < f64::EPSILON);
        assert!((doc.iva - 150.0).abs() < f64::EPSILON);
        assert!((doc.importe_total - 1150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_row_to_document_rejects_short_rows() {
        let row = TableRow::new(Some("0"), vec!["No se encontraron registros".to_string()]);
        let err = row_to_document(&row, &full_map(), TableKind::Received, 1, 0).unwrap_err();
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn test_row_to_document_rejects_out_of_range_mapping() {
        let mut row_cells = cells(1, "abc");
        row_cells.truncate(8);
        let row = TableRow::new(Some("0"), row_cells);
        let err = row_to_document(&row, &full_map(), TableKind::Received, 1, 0).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_row_to_document_fallback_id_without_access_key() {
        let row = TableRow::new(Some("4"), cells(5, ""));
        let doc = row_to_document(&row, &full_map(), TableKind::Issued, 1, 4).unwrap();
        assert!(doc.id.starts_with("row-"));
        assert_eq!(doc.table_kind, TableKind::Issued);
    }

    #[test]
    fn test_parse_row_number() {
        assert_eq!(parse_row_number(" 12 "), Some(12));
        assert_eq!(parse_row_number("0"), None);
        assert_eq!(parse_row_number("abc"), None);
    }
}
