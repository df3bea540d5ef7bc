//! [`PageAccessor`] over captured portal HTML.
//!
//! Each captured document is one paginator page. Markup is parsed eagerly into
//! owned snapshots because the parsed DOM is not `Send`.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};

use super::{PageAccessor, PageError, TableHandle, TableRow};
use crate::document::{FORM_ID, TableKind};

/// Name of the hidden input carrying the server-side state token.
pub const STATE_TOKEN_FIELD: &str = "javax.faces.ViewState";

/// Class the paginator uses for disabled controls.
const DISABLED_CLASS: &str = "ui-state-disabled";

/// Input types that never travel with a form submission.
const SKIPPED_INPUT_TYPES: [&str; 4] = ["submit", "button", "image", "reset"];

#[derive(Debug, Clone)]
struct TableSnapshot {
    kind: TableKind,
    element_id: String,
    headers: Vec<String>,
    rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default)]
struct PageSnapshot {
    tables: Vec<TableSnapshot>,
    caption: Option<String>,
    next_disabled: bool,
    page_sizes: Vec<u32>,
    state_token: Option<String>,
    form_params: Vec<(String, String)>,
}

impl PageSnapshot {
    fn table(&self, handle: &TableHandle) -> Result<&TableSnapshot, PageError> {
        self.tables
            .iter()
            .find(|t| t.element_id == handle.element_id)
            .ok_or_else(|| PageError::unavailable(format!("table {}", handle.element_id)))
    }
}

struct Selectors {
    header: Selector,
    row: Selector,
    cell: Selector,
    caption: Selector,
    next: Selector,
    page_size: Selector,
    state_token: Selector,
    form: Selector,
    input: Selector,
    select: Selector,
    option: Selector,
}

impl Selectors {
    fn new() -> Result<Self, PageError> {
        Ok(Self {
            header: parse_selector("thead th")?,
            row: parse_selector("tbody tr")?,
            cell: parse_selector("td")?,
            caption: parse_selector(".ui-paginator-current")?,
            next: parse_selector(".ui-paginator-next")?,
            page_size: parse_selector(".ui-paginator-rpp-options option")?,
            state_token: parse_selector(&format!("input[name=\"{STATE_TOKEN_FIELD}\"]"))?,
            form: parse_selector(&format!("form[id=\"{FORM_ID}\"]"))?,
            input: parse_selector("input[name]")?,
            select: parse_selector("select[name]")?,
            option: parse_selector("option")?,
        })
    }

    fn table(kind: TableKind) -> Result<Selector, PageError> {
        parse_selector(&format!("[id$=\"{}\"]", kind.table_id()))
    }
}

fn parse_selector(source: &str) -> Result<Selector, PageError> {
    Selector::parse(source).map_err(|e| PageError::parse(format!("selector `{source}`: {e}")))
}

/// Page accessor backed by a sequence of captured HTML pages.
#[derive(Debug)]
pub struct HtmlSnapshotPage {
    pages: Vec<PageSnapshot>,
    current: AtomicUsize,
    requested_page_size: AtomicU32,
}

impl HtmlSnapshotPage {
    /// Parses one HTML document per paginator page, in page order.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Unavailable`] when no pages are given and
    /// [`PageError::Parse`] when a selector cannot be compiled.
    pub fn from_html<S: AsRef<str>>(pages: &[S]) -> Result<Self, PageError> {
        if pages.is_empty() {
            return Err(PageError::unavailable("captured page"));
        }
        let selectors = Selectors::new()?;
        let pages = pages
            .iter()
            .map(|html| parse_page(html.as_ref(), &selectors))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(pages = pages.len(), "parsed captured portal pages");

        Ok(Self {
            pages,
            current: AtomicUsize::new(0),
            requested_page_size: AtomicU32::new(0),
        })
    }

    /// Zero-based index of the page currently "displayed".
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Last page size requested through [`PageAccessor::set_page_size`].
    #[must_use]
    pub fn requested_page_size(&self) -> Option<u32> {
        match self.requested_page_size.load(Ordering::SeqCst) {
            0 => None,
            size => Some(size),
        }
    }

    fn page(&self) -> Result<&PageSnapshot, PageError> {
        self.pages
            .get(self.current_page())
            .ok_or_else(|| PageError::unavailable("current page"))
    }
}

fn parse_page(html: &str, selectors: &Selectors) -> Result<PageSnapshot, PageError> {
    let document = Html::parse_document(html);
    let mut snapshot = PageSnapshot::default();

    for kind in TableKind::ALL {
        let selector = Selectors::table(kind)?;
        if let Some(table) = document.select(&selector).next() {
            snapshot.tables.push(parse_table(kind, table, selectors));
        }
    }

    snapshot.caption = document
        .select(&selectors.caption)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()));

    // A page without a "next" control has nowhere to go.
    snapshot.next_disabled = document
        .select(&selectors.next)
        .next()
        .is_none_or(|el| el.value().classes().any(|c| c == DISABLED_CLASS));

    let mut sizes: Vec<u32> = document
        .select(&selectors.page_size)
        .filter_map(|opt| {
            opt.value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| opt.text().collect())
                .trim()
                .parse()
                .ok()
        })
        .collect();
    sizes.sort_unstable();
    sizes.dedup();
    snapshot.page_sizes = sizes;

    snapshot.state_token = document
        .select(&selectors.state_token)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string);

    if let Some(form) = document.select(&selectors.form).next() {
        snapshot.form_params = parse_form_params(form, selectors);
    }

    Ok(snapshot)
}

fn parse_table(kind: TableKind, table: ElementRef<'_>, selectors: &Selectors) -> TableSnapshot {
    let headers = table
        .select(&selectors.header)
        .map(|th| collapse_whitespace(&th.text().collect::<String>()))
        .collect();
    let rows = table
        .select(&selectors.row)
        .map(|tr| {
            let cells = tr.select(&selectors.cell).map(cell_text).collect();
            TableRow::new(tr.value().attr("data-ri"), cells)
        })
        .collect();

    TableSnapshot {
        kind,
        element_id: table.value().attr("id").unwrap_or(kind.table_id()).to_string(),
        headers,
        rows,
    }
}

fn parse_form_params(form: ElementRef<'_>, selectors: &Selectors) -> Vec<(String, String)> {
    let mut params = Vec::new();

    for input in form.select(&selectors.input) {
        let element = input.value();
        let Some(name) = element.attr("name") else {
            continue;
        };
        let input_type = element.attr("type").unwrap_or("text").to_ascii_lowercase();
        if name == STATE_TOKEN_FIELD || SKIPPED_INPUT_TYPES.contains(&input_type.as_str()) {
            continue;
        }
        if (input_type == "checkbox" || input_type == "radio") && element.attr("checked").is_none()
        {
            continue;
        }
        params.push((name.to_string(), element.attr("value").unwrap_or("").to_string()));
    }

    for select in form.select(&selectors.select) {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        let options: Vec<ElementRef<'_>> = select.select(&selectors.option).collect();
        let chosen = options
            .iter()
            .find(|opt| opt.value().attr("selected").is_some())
            .or_else(|| options.first());
        if let Some(option) = chosen {
            let value = option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
            params.push((name.to_string(), value));
        }
    }

    params
}

/// Cell text with `<br>` kept as line breaks and each line whitespace-collapsed.
fn cell_text(cell: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(text) => raw.push_str(text),
            Node::Element(element) if element.name() == "br" => raw.push('\n'),
            _ => {}
        }
    }
    raw.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl PageAccessor for HtmlSnapshotPage {
    async fn find_table(&self, kind: TableKind) -> Result<Option<TableHandle>, PageError> {
        Ok(self
            .page()?
            .tables
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| TableHandle::new(t.kind, t.element_id.clone())))
    }

    async fn header_cells(&self, table: &TableHandle) -> Result<Vec<String>, PageError> {
        Ok(self.page()?.table(table)?.headers.clone())
    }

    async fn row_count(&self, table: &TableHandle) -> Result<usize, PageError> {
        Ok(self.page()?.table(table)?.rows.len())
    }

    async fn row_at(&self, table: &TableHandle, index: usize) -> Result<TableRow, PageError> {
        self.page()?
            .table(table)?
            .rows
            .get(index)
            .cloned()
            .ok_or_else(|| PageError::unavailable(format!("row {index}")))
    }

    async fn row_by_key(
        &self,
        table: &TableHandle,
        key: &str,
    ) -> Result<Option<TableRow>, PageError> {
        Ok(self
            .page()?
            .table(table)?
            .rows
            .iter()
            .find(|row| row.key.as_deref() == Some(key))
            .cloned())
    }

    async fn paginator_caption(&self) -> Result<Option<String>, PageError> {
        Ok(self.page()?.caption.clone())
    }

    async fn is_next_disabled(&self) -> Result<bool, PageError> {
        let page = self.page()?;
        Ok(page.next_disabled || self.current_page() + 1 >= self.pages.len())
    }

    #[instrument(skip(self))]
    async fn click_next(&self) -> Result<(), PageError> {
        let current = self.current_page();
        if current + 1 >= self.pages.len() {
            return Err(PageError::unavailable("next page"));
        }
        self.current.store(current + 1, Ordering::SeqCst);
        debug!(page = current + 2, "advanced to next captured page");
        Ok(())
    }

    async fn page_size_options(&self) -> Result<Vec<u32>, PageError> {
        Ok(self.page()?.page_sizes.clone())
    }

    async fn set_page_size(&self, size: u32) -> Result<(), PageError> {
        // Captured pages keep their original size; the request is only recorded.
        self.requested_page_size.store(size, Ordering::SeqCst);
        debug!(size, "page size requested on captured pages");
        Ok(())
    }

    async fn read_state_token(&self) -> Result<Option<String>, PageError> {
        Ok(self.page()?.state_token.clone())
    }

    async fn read_filter_params(
        &self,
        kind: TableKind,
    ) -> Result<Vec<(String, String)>, PageError> {
        let other = TableKind::ALL
            .into_iter()
            .find(|k| *k != kind)
            .map_or("", TableKind::table_id);
        Ok(self
            .page()?
            .form_params
            .iter()
            .filter(|(name, _)| other.is_empty() || !name.contains(other))
            .cloned()
            .collect())
    }
}
