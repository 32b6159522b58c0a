//! Per-key comparison rules.

use keyspace_types::{Bytes, KeyValue, ScoredMember, StreamEntry, Ttl, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{CompareConfig, CompareMode};

/// Classification of one key across both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    /// Present on the source, absent on the target.
    Missing,
    /// Absent on the source, present on the target.
    Extra,
    TypeMismatch,
    ValueMismatch,
    /// Type and value agree but the expirations differ beyond tolerance.
    TtlMismatch,
}

impl Verdict {
    pub const ALL: [Verdict; 6] = [
        Verdict::Match,
        Verdict::Missing,
        Verdict::Extra,
        Verdict::TypeMismatch,
        Verdict::ValueMismatch,
        Verdict::TtlMismatch,
    ];

    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }

    /// Short label used in status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Match => "match",
            Verdict::Missing => "missing",
            Verdict::Extra => "extra",
            Verdict::TypeMismatch => "type",
            Verdict::ValueMismatch => "value",
            Verdict::TtlMismatch => "ttl",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Match => "MATCH",
            Verdict::Missing => "MISSING",
            Verdict::Extra => "EXTRA",
            Verdict::TypeMismatch => "TYPE_MISMATCH",
            Verdict::ValueMismatch => "VALUE_MISMATCH",
            Verdict::TtlMismatch => "TTL_MISMATCH",
        };
        f.write_str(name)
    }
}

/// Pure comparison of two snapshots.
///
/// Checks run in a fixed order and the first failing check decides:
/// existence, type, value (full mode only), TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyComparator {
    pub mode: CompareMode,
    pub ttl_tolerance: Duration,
    pub compare_stream_ids: bool,
    pub score_tolerance: f64,
}

impl Default for KeyComparator {
    fn default() -> Self {
        Self {
            mode: CompareMode::Full,
            ttl_tolerance: Duration::ZERO,
            compare_stream_ids: true,
            score_tolerance: 0.0,
        }
    }
}

impl From<&CompareConfig> for KeyComparator {
    fn from(config: &CompareConfig) -> Self {
        Self {
            mode: config.mode,
            ttl_tolerance: config.ttl_tolerance,
            compare_stream_ids: config.compare_stream_ids,
            score_tolerance: config.score_tolerance,
        }
    }
}

impl KeyComparator {
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_ttl_tolerance(mut self, tolerance: Duration) -> Self {
        self.ttl_tolerance = tolerance;
        self
    }

    pub fn with_compare_stream_ids(mut self, compare: bool) -> Self {
        self.compare_stream_ids = compare;
        self
    }

    pub fn with_score_tolerance(mut self, tolerance: f64) -> Self {
        self.score_tolerance = tolerance;
        self
    }

    /// Exactly one verdict for any pair of snapshots.
    ///
    /// Two absent snapshots agree that the key does not exist and yield
    /// [`Verdict::Match`]; the pipeline never submits such a pair.
    pub fn compare(&self, source: &KeyValue, target: &KeyValue) -> Verdict {
        match (source.exists(), target.exists()) {
            (false, false) => return Verdict::Match,
            (true, false) => return Verdict::Missing,
            (false, true) => return Verdict::Extra,
            (true, true) => {}
        }

        if source.data_type != target.data_type {
            return Verdict::TypeMismatch;
        }

        if self.mode == CompareMode::Full && !self.values_equal(&source.value, &target.value) {
            return Verdict::ValueMismatch;
        }

        if !self.ttl_equal(source.ttl, target.ttl) {
            return Verdict::TtlMismatch;
        }

        Verdict::Match
    }

    fn ttl_equal(&self, source: Option<Ttl>, target: Option<Ttl>) -> bool {
        // A present key without TTL information is treated as persistent.
        let source = source.unwrap_or(Ttl::Persistent);
        let target = target.unwrap_or(Ttl::Persistent);
        match (source, target) {
            (Ttl::Persistent, Ttl::Persistent) => true,
            (Ttl::ExpiresIn(a), Ttl::ExpiresIn(b)) => {
                let drift = if a > b { a - b } else { b - a };
                drift <= self.ttl_tolerance
            }
            _ => false,
        }
    }

    fn values_equal(&self, source: &Option<Value>, target: &Option<Value>) -> bool {
        match (source, target) {
            (Some(a), Some(b)) => self.value_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn value_equal(&self, source: &Value, target: &Value) -> bool {
        match (source, target) {
            (Value::String(a), Value::String(b)) | (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => unordered_equal(a, b),
            (Value::Hash(a), Value::Hash(b)) => fields_equal(a, b),
            (Value::SortedSet(a), Value::SortedSet(b)) => self.sorted_sets_equal(a, b),
            (Value::Stream(a), Value::Stream(b)) => self.streams_equal(a, b),
            _ => false,
        }
    }

    fn sorted_sets_equal(&self, source: &[ScoredMember], target: &[ScoredMember]) -> bool {
        if source.len() != target.len() {
            return false;
        }
        let mut source: Vec<&ScoredMember> = source.iter().collect();
        let mut target: Vec<&ScoredMember> = target.iter().collect();
        source.sort_by(|a, b| a.member.cmp(&b.member));
        target.sort_by(|a, b| a.member.cmp(&b.member));
        source
            .iter()
            .zip(target.iter())
            .all(|(a, b)| a.member == b.member && self.scores_equal(a.score, b.score))
    }

    fn scores_equal(&self, a: f64, b: f64) -> bool {
        a == b || (self.score_tolerance > 0.0 && (a - b).abs() <= self.score_tolerance)
    }

    fn streams_equal(&self, source: &[StreamEntry], target: &[StreamEntry]) -> bool {
        source.len() == target.len()
            && source.iter().zip(target.iter()).all(|(a, b)| {
                (!self.compare_stream_ids || a.id == b.id) && fields_equal(&a.fields, &b.fields)
            })
    }
}

fn unordered_equal(a: &[Bytes], b: &[Bytes]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&Bytes> = a.iter().collect();
    let mut b: Vec<&Bytes> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

fn fields_equal(a: &[(Bytes, Bytes)], b: &[(Bytes, Bytes)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<(&Bytes, &Bytes)> = a.iter().map(|(f, v)| (f, v)).collect();
    let mut b: Vec<(&Bytes, &Bytes)> = b.iter().map(|(f, v)| (f, v)).collect();
    a.sort();
    b.sort();
    a == b
}
