//! Identifier rules: type-code classification and the
//! `{ORG}-{year}-{code}-{seq:06}` format.
//!
//! Sequence allocation needs storage and lives in the API crate; this module
//! only knows how to classify, compose and parse.

use serde::{Deserialize, Serialize};

/// Organization segment used when none is configured.
pub const DEFAULT_ORG_PREFIX: &str = "VB";

/// Width of the zero-padded sequence segment.
pub const SEQUENCE_WIDTH: usize = 6;

/// Short code derived from a diploma type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiplomaTypeCode {
    /// Tiến sĩ (doctorate)
    Tsi,
    /// Thạc sĩ (master)
    Ths,
    /// Kỹ sư (engineer)
    Ksu,
    /// Cử nhân (bachelor)
    Cnh,
}

impl DiplomaTypeCode {
    /// Classification patterns, highest priority first, already folded.
    const PATTERNS: [(&'static str, DiplomaTypeCode); 4] = [
        ("tien si", DiplomaTypeCode::Tsi),
        ("thac si", DiplomaTypeCode::Ths),
        ("ky su", DiplomaTypeCode::Ksu),
        ("cu nhan", DiplomaTypeCode::Cnh),
    ];

    /// Classify a free-text diploma type label.
    ///
    /// Matching is case-insensitive and ignores Vietnamese diacritics, so
    /// "Bằng Thạc sĩ" and "BANG THAC SI" both give `THS`. Unknown labels
    /// fall back to `CNH`.
    pub fn classify(label: &str) -> Self {
        let folded = fold_vietnamese(label);
        Self::PATTERNS
            .iter()
            .find(|(pattern, _)| folded.contains(pattern))
            .map(|(_, code)| *code)
            .unwrap_or(DiplomaTypeCode::Cnh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiplomaTypeCode::Tsi => "TSI",
            DiplomaTypeCode::Ths => "THS",
            DiplomaTypeCode::Ksu => "KSU",
            DiplomaTypeCode::Cnh => "CNH",
        }
    }
}

impl std::fmt::Display for DiplomaTypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case and strip Vietnamese diacritics, precomposed or combining.
pub fn fold_vietnamese(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .map(|c| match c {
            'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
            | 'ẩ' | 'ẫ' | 'ậ' => 'a',
            'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
            'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
            'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
            | 'ở' | 'ỡ' | 'ợ' => 'o',
            'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
            'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
            'đ' => 'd',
            other => other,
        })
        .collect()
}

/// The fixed part of an identifier: `{ORG}-{year}-{code}-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPrefix {
    pub org: String,
    pub year: i32,
    pub code: DiplomaTypeCode,
}

impl IdentifierPrefix {
    pub fn new(org: impl Into<String>, year: i32, diploma_type: &str) -> Self {
        Self {
            org: org.into(),
            year,
            code: DiplomaTypeCode::classify(diploma_type),
        }
    }

    /// Full identifier for a sequence number.
    pub fn compose(&self, sequence: u32) -> String {
        format!("{}{:0width$}", self, sequence, width = SEQUENCE_WIDTH)
    }

    /// Sequence number of an identifier carrying this prefix.
    ///
    /// `None` when the identifier has another prefix or a non-numeric tail.
    pub fn sequence_of(&self, identifier: &str) -> Option<u32> {
        let tail = identifier.strip_prefix(self.to_string().as_str())?;
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        tail.parse().ok()
    }
}

/// Largest sequence that fits the fixed-width tail.
pub const MAX_SEQUENCE: u32 = 999_999;

/// Whether `identifier` is `prefix` followed by exactly [`SEQUENCE_WIDTH`]
/// ASCII digits. Legacy or hand-edited identifiers sharing the prefix fail.
pub fn has_sequence_tail(identifier: &str, prefix: &str) -> bool {
    identifier.strip_prefix(prefix).is_some_and(|tail| {
        tail.len() == SEQUENCE_WIDTH && tail.bytes().all(|b| b.is_ascii_digit())
    })
}

impl std::fmt::Display for IdentifierPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}-", self.org, self.year, self.code)
    }
}
