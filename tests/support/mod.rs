//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use comprobantes_core::{PageAccessor, PageError, TableHandle, TableKind, TableRow};

pub const TABLE_ID: &str = "frmPrincipal:tablaCompRecibidos";

pub const STATE_TOKEN: &str = "-4455:1122";

/// Header labels of the received-documents table.
pub fn received_headers() -> Vec<String> {
    [
        "Nro",
        "RUC y Razón social emisor",
        "Tipo y serie de comprobante",
        "Clave de acceso",
        "Fecha y hora de autorización",
        "Fecha emisión",
        "Valor sin impuestos",
        "IVA",
        "Importe total",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Access key of the row numbered `number` (one-based).
pub fn clave(number: usize) -> String {
    format!("05032024011790012345001200100100000{number:04}")
}

/// A rendered row numbered `number` (one-based, continuous across pages).
pub fn row(number: usize) -> TableRow {
    let cells = vec![
        number.to_string(),
        "1790012345001\nACME S.A.".to_string(),
        format!("Factura 001-001-{number:09}"),
        clave(number),
        "05/03/2024 13:45:10".to_string(),
        "05/03/2024".to_string(),
        "100.00".to_string(),
        "15.00".to_string(),
        "115.00".to_string(),
    ];
    TableRow::new(Some(&(number - 1).to_string()), cells)
}

/// In-memory portal with `pages` pages of `rows_per_page` rows each.
pub struct FakePortal {
    headers: Vec<String>,
    pages: Vec<Vec<TableRow>>,
    current: AtomicUsize,
    fail_click_on: Option<usize>,
    state_token: Mutex<Option<String>>,
    page_size: AtomicU32,
    clicks: AtomicUsize,
    flaky_row: Option<(usize, AtomicU32)>,
    stale_render: bool,
}

impl FakePortal {
    pub fn new(pages: usize, rows_per_page: usize) -> Self {
        let pages = (0..pages)
            .map(|page| {
                (0..rows_per_page)
                    .map(|i| row(page * rows_per_page + i + 1))
                    .collect()
            })
            .collect();
        Self {
            headers: received_headers(),
            pages,
            current: AtomicUsize::new(0),
            fail_click_on: None,
            state_token: Mutex::new(Some(STATE_TOKEN.to_string())),
            page_size: AtomicU32::new(0),
            clicks: AtomicUsize::new(0),
            flaky_row: None,
            stale_render: false,
        }
    }

    /// Drops the header whose label contains `fragment`.
    pub fn without_header(mut self, fragment: &str) -> Self {
        for header in &mut self.headers {
            if header.contains(fragment) {
                *header = "Acciones".to_string();
            }
        }
        self
    }

    /// Makes "next" fail while page `page` (zero-based) is shown.
    pub fn failing_next_on(mut self, page: usize) -> Self {
        self.fail_click_on = Some(page);
        self
    }

    /// Makes reads of physical row `index` fail transiently `failures` times.
    pub fn flaky_row(mut self, index: usize, failures: u32) -> Self {
        self.flaky_row = Some((index, AtomicU32::new(failures)));
        self
    }

    /// Renders rows bottom-up: each physical slot shows the numbering cell of
    /// the mirrored row while keeping the key and content of the row it
    /// replaced, like a virtualized table mid re-render.
    pub fn with_stale_render(mut self) -> Self {
        self.stale_render = true;
        self
    }

    pub fn set_state_token(&self, token: Option<&str>) {
        *self.state_token.lock().unwrap() = token.map(str::to_string);
    }

    /// Shows the first page again.
    pub fn rewind(&self) {
        self.current.store(0, Ordering::SeqCst);
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn requested_page_size(&self) -> Option<u32> {
        match self.page_size.load(Ordering::SeqCst) {
            0 => None,
            size => Some(size),
        }
    }

    fn rows(&self) -> &[TableRow] {
        &self.pages[self.current.load(Ordering::SeqCst)]
    }
}

#[async_trait]
impl PageAccessor for FakePortal {
    async fn find_table(&self, kind: TableKind) -> Result<Option<TableHandle>, PageError> {
        Ok((kind == TableKind::Received).then(|| TableHandle::new(kind, TABLE_ID)))
    }

    async fn header_cells(&self, _table: &TableHandle) -> Result<Vec<String>, PageError> {
        Ok(self.headers.clone())
    }

    async fn row_count(&self, _table: &TableHandle) -> Result<usize, PageError> {
        Ok(self.rows().len())
    }

    async fn row_at(&self, _table: &TableHandle, index: usize) -> Result<TableRow, PageError> {
        if let Some((flaky, remaining)) = &self.flaky_row
            && *flaky == index
            && remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(PageError::transient("row_at", "row detached during re-render"));
        }

        let rows = self.rows();
        let rendered = rows
            .get(index)
            .ok_or_else(|| PageError::unavailable(format!("row {index}")))?;
        if !self.stale_render {
            return Ok(rendered.clone());
        }

        let mirrored = &rows[rows.len() - 1 - index];
        let mut cells = rendered.cells.clone();
        cells[0].clone_from(&mirrored.cells[0]);
        Ok(TableRow::new(rendered.key.as_deref(), cells))
    }

    async fn row_by_key(
        &self,
        _table: &TableHandle,
        key: &str,
    ) -> Result<Option<TableRow>, PageError> {
        Ok(self
            .rows()
            .iter()
            .find(|row| row.key.as_deref() == Some(key))
            .cloned())
    }

    async fn paginator_caption(&self) -> Result<Option<String>, PageError> {
        Ok(Some(format!(
            "({} of {})",
            self.current.load(Ordering::SeqCst) + 1,
            self.pages.len()
        )))
    }

    async fn is_next_disabled(&self) -> Result<bool, PageError> {
        Ok(self.current.load(Ordering::SeqCst) + 1 >= self.pages.len())
    }

    async fn click_next(&self) -> Result<(), PageError> {
        let current = self.current.load(Ordering::SeqCst);
        if self.fail_click_on == Some(current) {
            return Err(PageError::unavailable("next page"));
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        self.current.store(current + 1, Ordering::SeqCst);
        Ok(())
    }

    async fn page_size_options(&self) -> Result<Vec<u32>, PageError> {
        Ok(vec![10, 20, 50])
    }

    async fn set_page_size(&self, size: u32) -> Result<(), PageError> {
        self.page_size.store(size, Ordering::SeqCst);
        Ok(())
    }

    async fn read_state_token(&self) -> Result<Option<String>, PageError> {
        Ok(self.state_token.lock().unwrap().clone())
    }

    async fn read_filter_params(
        &self,
        _kind: TableKind,
    ) -> Result<Vec<(String, String)>, PageError> {
        Ok(vec![
            ("frmPrincipal:ano".to_string(), "2024".to_string()),
            ("frmPrincipal:mes".to_string(), "3".to_string()),
        ])
    }
}

/// Captured HTML of paginator page `page` of `total`, holding rows `numbers`.
pub fn received_page_html(page: usize, total: usize, numbers: &[usize]) -> String {
    let next_class = if page >= total {
        "ui-paginator-next ui-state-default ui-state-disabled"
    } else {
        "ui-paginator-next ui-state-default"
    };
    let headers: String = received_headers()
        .iter()
        .map(|h| format!("<th>{h}</th>"))
        .collect();
    let body: String = numbers
        .iter()
        .map(|&n| {
            let cells: String = row(n)
                .cells
                .iter()
                .map(|c| format!("<td>{}</td>", c.replace('\n', "<br/>")))
                .collect();
            format!("<tr data-ri=\"{}\">{cells}</tr>", n - 1)
        })
        .collect();
    format!(
        r#"<html><body><form id="frmPrincipal">
        <input type="hidden" name="frmPrincipal" value="frmPrincipal"/>
        <input type="hidden" name="javax.faces.ViewState" value="{STATE_TOKEN}"/>
        <select name="frmPrincipal:ano"><option value="2024" selected="selected">2024</option></select>
        <div id="{TABLE_ID}" class="ui-datatable">
          <div class="ui-paginator">
            <span class="ui-paginator-current">({page} of {total})</span>
            <a class="{next_class}">next</a>
            <select class="ui-paginator-rpp-options"><option value="10">10</option><option value="50">50</option></select>
          </div>
          <table><thead><tr>{headers}</tr></thead><tbody>{body}</tbody></table>
        </div>
        </form></body></html>"#
    )
}
