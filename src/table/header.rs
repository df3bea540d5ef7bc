//! Column resolution from header labels.
//!
//! Header labels drift between the two table kinds and across portal
//! releases, so columns are located by label fragments instead of position.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Semantic column meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderKey {
    RucRazonSocial,
    TipoSerie,
    ClaveAcceso,
    FechaAutorizacion,
    FechaEmision,
    ValorSinImpuestos,
    Iva,
    ImporteTotal,
}

impl HeaderKey {
    /// Keys a table must resolve before its rows can be extracted.
    pub const REQUIRED: [HeaderKey; 7] = [
        HeaderKey::RucRazonSocial,
        HeaderKey::TipoSerie,
        HeaderKey::ClaveAcceso,
        HeaderKey::FechaAutorizacion,
        HeaderKey::FechaEmision,
        HeaderKey::ValorSinImpuestos,
        HeaderKey::ImporteTotal,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RucRazonSocial => "ruc_razon_social",
            Self::TipoSerie => "tipo_serie",
            Self::ClaveAcceso => "clave_acceso",
            Self::FechaAutorizacion => "fecha_autorizacion",
            Self::FechaEmision => "fecha_emision",
            Self::ValorSinImpuestos => "valor_sin_impuestos",
            Self::Iva => "iva",
            Self::ImporteTotal => "importe_total",
        }
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A header matches a rule when it contains every fragment of the rule.
struct LabelRule {
    key: HeaderKey,
    fragments: &'static [&'static str],
}

/// Label fragments, matched against accent-folded lowercase header text.
const LABEL_RULES: &[LabelRule] = &[
    LabelRule { key: HeaderKey::RucRazonSocial, fragments: &["ruc", "social"] },
    LabelRule { key: HeaderKey::RucRazonSocial, fragments: &["razon social"] },
    LabelRule { key: HeaderKey::TipoSerie, fragments: &["tipo", "serie"] },
    LabelRule { key: HeaderKey::TipoSerie, fragments: &["comprobante", "serie"] },
    LabelRule { key: HeaderKey::ClaveAcceso, fragments: &["clave de acceso"] },
    LabelRule { key: HeaderKey::ClaveAcceso, fragments: &["clave", "acceso"] },
    LabelRule { key: HeaderKey::FechaAutorizacion, fragments: &["fecha", "autorizacion"] },
    LabelRule { key: HeaderKey::FechaEmision, fragments: &["fecha", "emision"] },
    LabelRule { key: HeaderKey::ValorSinImpuestos, fragments: &["sin impuestos"] },
    LabelRule { key: HeaderKey::ValorSinImpuestos, fragments: &["subtotal"] },
    LabelRule { key: HeaderKey::Iva, fragments: &["iva"] },
    LabelRule { key: HeaderKey::ImporteTotal, fragments: &["importe total"] },
    LabelRule { key: HeaderKey::ImporteTotal, fragments: &["valor total"] },
];

/// Resolved column index per semantic key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderMap {
    columns: BTreeMap<HeaderKey, usize>,
}

impl HeaderMap {
    /// Column index of a key, if resolved.
    #[must_use]
    pub fn get(&self, key: HeaderKey) -> Option<usize> {
        self.columns.get(&key).copied()
    }

    /// Assigns a column to a key, replacing an earlier assignment.
    pub fn insert(&mut self, key: HeaderKey, column: usize) {
        self.columns.insert(key, column);
    }

    /// Required keys that were not resolved, in [`HeaderKey::REQUIRED`] order.
    #[must_use]
    pub fn missing(&self) -> Vec<HeaderKey> {
        HeaderKey::REQUIRED
            .into_iter()
            .filter(|key| !self.columns.contains_key(key))
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Highest column index referenced by the map.
    #[must_use]
    pub fn max_column(&self) -> Option<usize> {
        self.columns.values().copied().max()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Builds [`HeaderMap`]s from header cell text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMapper;

impl HeaderMapper {
    /// Maps header cells to semantic keys.
    ///
    /// Every header is tested against every rule, so the result does not
    /// depend on column order. When several headers match the same key the
    /// last one wins.
    #[must_use]
    pub fn map<S: AsRef<str>>(headers: &[S]) -> HeaderMap {
        let mut map = HeaderMap::default();
        for (column, header) in headers.iter().enumerate() {
            let label = normalize_label(header.as_ref());
            for rule in LABEL_RULES {
                if rule.fragments.iter().all(|fragment| label.contains(fragment)) {
                    map.insert(rule.key, column);
                }
            }
        }
        debug!(resolved = map.len(), missing = ?map.missing(), "mapped table headers");
        map
    }
}

/// Lowercases, folds Spanish accents and collapses whitespace.
fn normalize_label(label: &str) -> String {
    let folded: String = label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            c => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
