//! Document records extracted from the portal tables.
//!
//! A [`Document`] is created once per table row during a scan. It is never
//! edited afterwards except for the file-exists verification flags, and a new
//! scan replaces the whole set.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Form id that wraps both portal tables.
pub const FORM_ID: &str = "frmPrincipal";

/// Number of hex characters kept from the fallback id digest.
const FALLBACK_ID_HEX_LEN: usize = 16;

/// Which of the two portal tables a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Documents received from suppliers.
    Received,
    /// Documents issued by the account holder.
    Issued,
}

impl TableKind {
    /// Detection order used when probing a page.
    pub const ALL: [TableKind; 2] = [TableKind::Received, TableKind::Issued];

    /// Table element id suffix the portal uses for this kind.
    #[must_use]
    pub fn table_id(self) -> &'static str {
        match self {
            Self::Received => "tablaCompRecibidos",
            Self::Issued => "tablaCompEmitidos",
        }
    }

    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Issued => "issued",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Downloadable representation of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Signed XML as authorized by the tax authority.
    Xml,
    /// Printable PDF rendering (RIDE).
    Pdf,
}

impl DocumentFormat {
    /// Suffix of the portal link id (`lnkXml` / `lnkPdf`).
    #[must_use]
    pub fn link_suffix(self) -> &'static str {
        match self {
            Self::Xml => "Xml",
            Self::Pdf => "Pdf",
        }
    }

    /// File extension for saved payloads.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "pdf" => Ok(Self::Pdf),
            _ => Err(format!("invalid document format: {s}")),
        }
    }
}

/// One tax-compliance record read from a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Access key, or a deterministic row digest when the key cell is empty.
    pub id: String,
    /// Logical (zero-based) row index inside the portal table.
    pub row_index: usize,
    /// One-based paginator page the row was read from.
    pub page_number: u32,
    /// Raw type + series + sequence text.
    pub numero: String,
    pub ruc: String,
    pub razon_social: String,
    pub tipo_comprobante: String,
    pub serie: String,
    pub numero_comprobante: String,
    pub clave_acceso: String,
    pub fecha_emision: String,
    pub fecha_autorizacion: String,
    pub valor_sin_impuestos: f64,
    pub iva: f64,
    pub importe_total: f64,
    /// Table the row belongs to.
    pub table_kind: TableKind,
    /// Whether the XML file was verified to exist, once checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_exists: Option<bool>,
    /// Whether the PDF file was verified to exist, once checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_exists: Option<bool>,
}

impl Document {
    /// Builds the document id from the access key, falling back to a digest of
    /// the row position and identifying text.
    #[must_use]
    pub fn derive_id(clave_acceso: &str, page_number: u32, row_index: usize, numero: &str, ruc: &str) -> String {
        let clave = clave_acceso.trim();
        if !clave.is_empty() {
            return clave.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(page_number.to_be_bytes());
        hasher.update(row_index.to_be_bytes());
        hasher.update(numero.as_bytes());
        hasher.update([0]);
        hasher.update(ruc.as_bytes());
        let digest = hasher.finalize();

        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("row-{}", &hex[..FALLBACK_ID_HEX_LEN])
    }

    /// Records the result of a file-exists check for one format.
    pub fn attach_verification(&mut self, format: DocumentFormat, exists: bool) {
        match format {
            DocumentFormat::Xml => self.xml_exists = Some(exists),
            DocumentFormat::Pdf => self.pdf_exists = Some(exists),
        }
    }

    /// Returns the recorded file-exists flag for a format.
    #[must_use]
    pub fn verified(&self, format: DocumentFormat) -> Option<bool> {
        match format {
            DocumentFormat::Xml => self.xml_exists,
            DocumentFormat::Pdf => self.pdf_exists,
        }
    }

    /// Filename used when saving this document in the given format.
    ///
    /// Prefers the access key; otherwise `<tipo>_<serie>-<numero>`.
    #[must_use]
    pub fn file_name(&self, format: DocumentFormat) -> String {
        let stem = if self.clave_acceso.trim().is_empty() {
            format!(
                "{}_{}-{}",
                self.tipo_comprobante, self.serie, self.numero_comprobante
            )
        } else {
            self.clave_acceso.trim().to_string()
        };
        format!("{}.{}", sanitize_stem(&stem), format.extension())
    }
}

/// Replaces characters that are unsafe in filenames and collapses whitespace.
fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "documento".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_document(clave: &str, row_index: usize) -> Document {
        Document {
            id: Document::derive_id(clave, 1, row_index, "Factura 001-001-000000001", "1790012345001"),
            row_index,
            page_number: 1,
            numero: "Factura 001-001-000000001".to_string(),
            ruc: "1790012345001".to_string(),
            razon_social: "ACME S.A.".to_string(),
            tipo_comprobante: "Factura".to_string(),
            serie: "001-001".to_string(),
            numero_comprobante: "000000001".to_string(),
            clave_acceso: clave.to_string(),
            fecha_emision: "2024-03-05".to_string(),
            fecha_autorizacion: "2024-03-05 13:45:10".to_string(),
            valor_sin_impuestos: 100.0,
            iva: 15.0,
            importe_total: 115.0,
            table_kind: TableKind::Received,
            xml_exists: None,
            pdf_exists: None,
        }
    }

    #[test]
    fn test_derive_id_prefers_access_key() {
        let id = Document::derive_id(" 0503202401179001234500120010010000000011234567811 ", 1, 0, "x", "y");
        assert_eq!(id, "0503202401179001234500120010010000000011234567811");
    }

    #[test]
    fn test_derive_id_fallback_is_deterministic() {
        let a = Document::derive_id("", 2, 4, "Factura 001-001-1", "1790012345001");
        let b = Document::derive_id("", 2, 4, "Factura 001-001-1", "1790012345001");
        assert_eq!(a, b);
        assert!(a.starts_with("row-"));
        assert_eq!(a.len(), 4 + FALLBACK_ID_HEX_LEN);
    }

    #[test]
    fn test_derive_id_fallback_differs_by_position() {
        let a = Document::derive_id("", 1, 0, "n", "r");
        let b = Document::derive_id("", 1, 1, "n", "r");
        assert_ne!(a, b);
    }

    #[test]
    fn test_attach_verification_sets_only_requested_format() {
        let mut doc = sample_document("123", 0);
        doc.attach_verification(DocumentFormat::Pdf, true);
        assert_eq!(doc.verified(DocumentFormat::Pdf), Some(true));
        assert_eq!(doc.verified(DocumentFormat::Xml), None);
    }

    #[test]
    fn test_file_name_uses_access_key() {
        let doc = sample_document("0503202401", 0);
        assert_eq!(doc.file_name(DocumentFormat::Xml), "0503202401.xml");
    }

    #[test]
    fn test_file_name_fallback_is_sanitized() {
        let mut doc = sample_document("", 0);
        doc.tipo_comprobante = "Nota de Crédito".to_string();
        assert_eq!(
            doc.file_name(DocumentFormat::Pdf),
            "Nota_de_Crédito_001-001-000000001.pdf"
        );
    }

    #[test]
    fn test_document_serializes_camel_case() {
        let doc = sample_document("abc", 3);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["claveAcceso"], "abc");
        assert_eq!(json["rowIndex"], 3);
        assert_eq!(json["razonSocial"], "ACME S.A.");
        assert!(json.get("xmlExists").is_none());
    }

    #[test]
    fn test_document_format_from_str() {
        assert_eq!("PDF".parse::<DocumentFormat>().unwrap(), DocumentFormat::Pdf);
        assert_eq!("xml".parse::<DocumentFormat>().unwrap(), DocumentFormat::Xml);
        assert!("docx".parse::<DocumentFormat>().is_err());
    }
}
