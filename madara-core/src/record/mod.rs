//! The Knowledge Record: a tagged-union value with clock/toi/quality
//! metadata, total arithmetic coercions, and an optional history ring.

pub mod any;
pub mod history;
pub mod precision;

use any::AnyPayload;
use history::History;
use std::cmp::Ordering;
use std::path::Path;

/// Binary payload subtype, inferred from a file extension on `read_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySubtype {
    Raw,
    Jpeg,
    Text,
    Xml,
    UnknownFile,
}

impl BinarySubtype {
    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => BinarySubtype::Jpeg,
            Some("txt") => BinarySubtype::Text,
            Some("xml") => BinarySubtype::Xml,
            _ => BinarySubtype::UnknownFile,
        }
    }
}

/// The tagged-union value domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Empty,
    Integer(i64),
    Double(f64),
    String(String),
    IntegerArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    Binary(Vec<u8>, BinarySubtype),
    Any(AnyPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Uncreated,
    Modified,
    Unmodified,
}

/// A Knowledge Record: value + metadata. `Record` is `Clone` (a deep,
/// value-semantic copy) because `Context::get` returns a copy by contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    variant: Variant,
    pub clock: u64,
    pub toi: u64,
    pub quality: u32,
    pub write_quality: u32,
    pub status: Status,
    /// Id of the agent that produced this value. Not part of spec §3.1's
    /// listed metadata, but required by the §4.2 reconciliation tie-break
    /// rule `(toi, originator_id)`, so it travels with the record.
    pub originator: String,
    history: Option<History>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            variant: Variant::Empty,
            clock: 0,
            toi: 0,
            quality: 0,
            write_quality: 0,
            status: Status::Uncreated,
            originator: String::new(),
            history: None,
        }
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integer(v: i64) -> Self {
        Self {
            variant: Variant::Integer(v),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn double(v: f64) -> Self {
        Self {
            variant: Variant::Double(v),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self {
            variant: Variant::String(v.into()),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn integer_array(v: Vec<i64>) -> Self {
        Self {
            variant: Variant::IntegerArray(v),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn double_array(v: Vec<f64>) -> Self {
        Self {
            variant: Variant::DoubleArray(v),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn binary(bytes: Vec<u8>, subtype: BinarySubtype) -> Self {
        Self {
            variant: Variant::Binary(bytes, subtype),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn any(payload: AnyPayload) -> Self {
        Self {
            variant: Variant::Any(payload),
            status: Status::Modified,
            ..Self::default()
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// Typed read of an `Any` record (spec §7's `BadAnyAccess`): decodes the
    /// payload if it is still raw bytes, then requires its tag to match
    /// `expected_tag` and its concrete type to match `T` before handing
    /// back a reference. Any mismatch — wrong variant, wrong tag, wrong
    /// concrete type, or an undecodable payload — is reported rather than
    /// silently returning a default value.
    pub fn as_any<T: any::AnyValue + 'static>(&mut self, expected_tag: &str) -> Result<&T, crate::error::BadAnyAccess> {
        let Variant::Any(payload) = &mut self.variant else {
            return Err(crate::error::BadAnyAccess::TagMismatch {
                expected: expected_tag.to_string(),
                found: "<non-Any record>".to_string(),
            });
        };
        let decoded = payload.ensure_decoded()?;
        if decoded.tag() != expected_tag {
            return Err(crate::error::BadAnyAccess::TagMismatch {
                expected: expected_tag.to_string(),
                found: decoded.tag().to_string(),
            });
        }
        decoded
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| crate::error::BadAnyAccess::TagMismatch {
                expected: expected_tag.to_string(),
                found: decoded.tag().to_string(),
            })
    }

    /// Replaces the value, transitioning `status` to `Modified` unless the
    /// record was `Uncreated` and the new value is itself `Empty` (setting
    /// Empty over Empty does not "create" the record).
    pub fn set(&mut self, value: Variant) {
        let becomes_empty = matches!(value, Variant::Empty);
        self.variant = value;
        if !(self.status == Status::Uncreated && becomes_empty) {
            self.status = Status::Modified;
        }
        self.push_history();
    }

    fn push_history(&mut self) {
        if let Some(history) = &mut self.history {
            let snapshot = Record {
                variant: self.variant.clone(),
                clock: self.clock,
                toi: self.toi,
                quality: self.quality,
                write_quality: self.write_quality,
                status: self.status,
                originator: self.originator.clone(),
                history: None,
            };
            history.push(snapshot);
        }
    }

    /// `clear`: sets `status = Uncreated`, variant = Empty, but leaves
    /// history/clock metadata alone (the caller's modification-set removal
    /// is `Context`'s responsibility).
    pub fn clear(&mut self) {
        self.variant = Variant::Empty;
        self.status = Status::Uncreated;
    }

    // ---------------------------------------------------------------
    // History
    // ---------------------------------------------------------------

    pub fn set_history_capacity(&mut self, capacity: usize) {
        match (&mut self.history, capacity) {
            (_, 0) => self.history = None,
            (Some(h), n) => h.set_capacity(n),
            (None, n) => self.history = Some(History::new(n)),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history.as_ref().map(|h| h.capacity()).unwrap_or(0)
    }

    pub fn get_history(&self, lo: i64, count: usize) -> Vec<Record> {
        self.history.as_ref().map(|h| h.get(lo, count)).unwrap_or_default()
    }

    pub fn get_history_one(&self, index: i64) -> Option<Record> {
        self.history.as_ref().and_then(|h| h.get_one(index))
    }

    // ---------------------------------------------------------------
    // Array element access
    // ---------------------------------------------------------------

    /// Sets element `i` of an array variant, extending with default
    /// (zero) values if `i` is out of bounds. No-op/coerces for non-array
    /// variants by first converting them to the appropriate array type
    /// only when currently `Empty`; otherwise this is a runtime no-op.
    pub fn set_index(&mut self, i: usize, value: i64) {
        match &mut self.variant {
            Variant::IntegerArray(arr) => {
                if i >= arr.len() {
                    arr.resize(i + 1, 0);
                }
                arr[i] = value;
            }
            Variant::Empty => {
                let mut arr = vec![0i64; i + 1];
                arr[i] = value;
                self.variant = Variant::IntegerArray(arr);
            }
            _ => {}
        }
        self.status = Status::Modified;
        self.push_history();
    }

    pub fn set_index_double(&mut self, i: usize, value: f64) {
        match &mut self.variant {
            Variant::DoubleArray(arr) => {
                if i >= arr.len() {
                    arr.resize(i + 1, 0.0);
                }
                arr[i] = value;
            }
            Variant::Empty => {
                let mut arr = vec![0.0f64; i + 1];
                arr[i] = value;
                self.variant = Variant::DoubleArray(arr);
            }
            _ => {}
        }
        self.status = Status::Modified;
        self.push_history();
    }

    // ---------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------

    pub fn read_file(path: &Path, hint_type: Option<BinarySubtype>) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let subtype = hint_type.unwrap_or_else(|| BinarySubtype::from_extension(path));
        Ok(Self::binary(bytes, subtype))
    }

    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        match &self.variant {
            Variant::Binary(bytes, _) => std::fs::write(path, bytes),
            other => std::fs::write(path, self.coerce_to_bytes(other)),
        }
    }

    fn coerce_to_bytes(&self, variant: &Variant) -> Vec<u8> {
        match variant {
            Variant::String(s) => s.clone().into_bytes(),
            other => format!("{}", RecordDisplay(other)).into_bytes(),
        }
    }

    // ---------------------------------------------------------------
    // Falsiness
    // ---------------------------------------------------------------

    pub fn is_false(&self) -> bool {
        match &self.variant {
            Variant::Empty => true,
            Variant::Integer(v) => *v == 0,
            Variant::Double(v) => *v == 0.0,
            Variant::String(s) => s.is_empty(),
            Variant::IntegerArray(a) => a.is_empty(),
            Variant::DoubleArray(a) => a.is_empty(),
            Variant::Binary(b, _) => b.is_empty(),
            Variant::Any(_) => false,
        }
    }

    pub fn is_true(&self) -> bool {
        !self.is_false()
    }

    // ---------------------------------------------------------------
    // Total coercions
    // ---------------------------------------------------------------

    pub fn to_integer(&self) -> i64 {
        match &self.variant {
            Variant::Empty => 0,
            Variant::Integer(v) => *v,
            Variant::Double(v) => *v as i64,
            Variant::String(s) => s.trim().parse::<i64>().unwrap_or_else(|_| {
                s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0)
            }),
            Variant::IntegerArray(a) => a.first().copied().unwrap_or(0),
            Variant::DoubleArray(a) => a.first().copied().unwrap_or(0.0) as i64,
            Variant::Binary(..) => 0,
            Variant::Any(_) => 0,
        }
    }

    pub fn to_double(&self) -> f64 {
        match &self.variant {
            Variant::Empty => 0.0,
            Variant::Integer(v) => *v as f64,
            Variant::Double(v) => *v,
            Variant::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Variant::IntegerArray(a) => a.first().copied().unwrap_or(0) as f64,
            Variant::DoubleArray(a) => a.first().copied().unwrap_or(0.0),
            Variant::Binary(..) => 0.0,
            Variant::Any(_) => 0.0,
        }
    }

    pub fn to_integers(&self) -> Vec<i64> {
        match &self.variant {
            Variant::Empty => vec![],
            Variant::Integer(v) => vec![*v],
            Variant::Double(v) => vec![*v as i64],
            Variant::IntegerArray(a) => a.clone(),
            Variant::DoubleArray(a) => a.iter().map(|v| *v as i64).collect(),
            Variant::String(s) => s
                .split(',')
                .map(|piece| piece.trim().parse::<i64>().unwrap_or(0))
                .collect(),
            Variant::Binary(..) => vec![],
            Variant::Any(_) => vec![],
        }
    }

    pub fn to_doubles(&self) -> Vec<f64> {
        match &self.variant {
            Variant::Empty => vec![],
            Variant::Integer(v) => vec![*v as f64],
            Variant::Double(v) => vec![*v],
            Variant::IntegerArray(a) => a.iter().map(|v| *v as f64).collect(),
            Variant::DoubleArray(a) => a.clone(),
            Variant::String(s) => s
                .split(',')
                .map(|piece| piece.trim().parse::<f64>().unwrap_or(0.0))
                .collect(),
            Variant::Binary(..) => vec![],
            Variant::Any(_) => vec![],
        }
    }

    pub fn to_string_with_delimiter(&self, delimiter: &str) -> String {
        match &self.variant {
            Variant::IntegerArray(a) => a
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(delimiter),
            Variant::DoubleArray(a) => a
                .iter()
                .map(|v| precision::format_double(*v))
                .collect::<Vec<_>>()
                .join(delimiter),
            other => format!("{}", RecordDisplay(other)),
        }
    }

    pub fn to_string(&self) -> String {
        self.to_string_with_delimiter(",")
    }

    // ---------------------------------------------------------------
    // Fragment / size
    // ---------------------------------------------------------------

    /// Inclusive byte/char slice of the underlying buffer, clamped to
    /// valid bounds. Operates on chars for `String`, bytes for `Binary`,
    /// and elements for arrays.
    pub fn fragment(&self, lo: i64, hi: i64) -> Record {
        let lo = lo.max(0) as usize;
        match &self.variant {
            Variant::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                if chars.is_empty() {
                    return Record::string("");
                }
                let hi = (hi.max(0) as usize).min(chars.len() - 1);
                if lo > hi || lo >= chars.len() {
                    return Record::string("");
                }
                Record::string(chars[lo..=hi].iter().collect::<String>())
            }
            Variant::Binary(bytes, subtype) => {
                if bytes.is_empty() {
                    return Record::binary(vec![], *subtype);
                }
                let hi = (hi.max(0) as usize).min(bytes.len() - 1);
                if lo > hi || lo >= bytes.len() {
                    return Record::binary(vec![], *subtype);
                }
                Record::binary(bytes[lo..=hi].to_vec(), *subtype)
            }
            Variant::IntegerArray(a) => {
                if a.is_empty() {
                    return Record::integer_array(vec![]);
                }
                let hi = (hi.max(0) as usize).min(a.len() - 1);
                if lo > hi || lo >= a.len() {
                    return Record::integer_array(vec![]);
                }
                Record::integer_array(a[lo..=hi].to_vec())
            }
            Variant::DoubleArray(a) => {
                if a.is_empty() {
                    return Record::double_array(vec![]);
                }
                let hi = (hi.max(0) as usize).min(a.len() - 1);
                if lo > hi || lo >= a.len() {
                    return Record::double_array(vec![]);
                }
                Record::double_array(a[lo..=hi].to_vec())
            }
            _ => Record::new(),
        }
    }

    pub fn size(&self) -> usize {
        match &self.variant {
            Variant::Empty => 0,
            Variant::Integer(_) | Variant::Double(_) => 1,
            Variant::String(s) => s.chars().count(),
            Variant::IntegerArray(a) => a.len(),
            Variant::DoubleArray(a) => a.len(),
            Variant::Binary(b, _) => b.len(),
            Variant::Any(p) => p.to_bytes().len(),
        }
    }

    // ---------------------------------------------------------------
    // Arithmetic (numeric promotion: any Double operand => Double result)
    // ---------------------------------------------------------------

    fn is_numeric_like(&self) -> bool {
        !matches!(self.variant, Variant::Binary(..) | Variant::Any(_))
    }

    fn is_double_like(&self) -> bool {
        matches!(self.variant, Variant::Double(_) | Variant::DoubleArray(_))
    }

    fn arith(&self, rhs: &Record, int_op: impl Fn(i64, i64) -> i64, f_op: impl Fn(f64, f64) -> f64) -> Record {
        if !self.is_numeric_like() || !rhs.is_numeric_like() {
            return Record::new();
        }
        // String-to-numeric coercion failure => Empty, no-op for side effects.
        if let Variant::String(s) = &self.variant {
            if s.trim().parse::<f64>().is_err() {
                return Record::new();
            }
        }
        if let Variant::String(s) = &rhs.variant {
            if s.trim().parse::<f64>().is_err() {
                return Record::new();
            }
        }
        if self.is_double_like() || rhs.is_double_like() {
            Record::double(f_op(self.to_double(), rhs.to_double()))
        } else {
            Record::integer(int_op(self.to_integer(), rhs.to_integer()))
        }
    }

    pub fn add(&self, rhs: &Record) -> Record {
        self.arith(rhs, |a, b| a.wrapping_add(b), |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Record) -> Record {
        self.arith(rhs, |a, b| a.wrapping_sub(b), |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Record) -> Record {
        self.arith(rhs, |a, b| a.wrapping_mul(b), |a, b| a * b)
    }

    /// Division by zero yields `Empty` at evaluation time; never traps.
    pub fn div(&self, rhs: &Record) -> Record {
        if !self.is_numeric_like() || !rhs.is_numeric_like() {
            return Record::new();
        }
        if self.is_double_like() || rhs.is_double_like() {
            let r = rhs.to_double();
            if r == 0.0 {
                return Record::new();
            }
            Record::double(self.to_double() / r)
        } else {
            let r = rhs.to_integer();
            if r == 0 {
                return Record::new();
            }
            Record::integer(self.to_integer() / r)
        }
    }

    pub fn rem(&self, rhs: &Record) -> Record {
        if !self.is_numeric_like() || !rhs.is_numeric_like() {
            return Record::new();
        }
        if self.is_double_like() || rhs.is_double_like() {
            let r = rhs.to_double();
            if r == 0.0 {
                return Record::new();
            }
            Record::double(self.to_double() % r)
        } else {
            let r = rhs.to_integer();
            if r == 0 {
                return Record::new();
            }
            Record::integer(self.to_integer() % r)
        }
    }

    pub fn negate(&self) -> Record {
        if self.is_double_like() {
            Record::double(-self.to_double())
        } else {
            Record::integer(-self.to_integer())
        }
    }

    /// Comparisons: numeric vs numeric by value; string vs string
    /// lexicographic; mixed coerces via `to_double`.
    pub fn compare(&self, rhs: &Record) -> Ordering {
        match (&self.variant, &rhs.variant) {
            (Variant::String(a), Variant::String(b)) => a.cmp(b),
            _ => self
                .to_double()
                .partial_cmp(&rhs.to_double())
                .unwrap_or(Ordering::Equal),
        }
    }
}

struct RecordDisplay<'a>(&'a Variant);

impl std::fmt::Display for RecordDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Variant::Empty => write!(f, ""),
            Variant::Integer(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", precision::format_double(*v)),
            Variant::String(s) => write!(f, "{}", s),
            Variant::IntegerArray(a) => write!(
                f,
                "{}",
                a.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
            ),
            Variant::DoubleArray(a) => write!(
                f,
                "{}",
                a.iter()
                    .map(|v| precision::format_double(*v))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Variant::Binary(b, _) => write!(f, "{}", String::from_utf8_lossy(b)),
            Variant::Any(p) => write!(f, "{}", p.fmt_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_arithmetic_scenario() {
        // "var1 = 10; var2 = 5; var1 / var2 + var2 % 3" -> 4
        let var1 = Record::integer(10);
        let var2 = Record::integer(5);
        let div = var1.div(&var2);
        let modulo = var2.rem(&Record::integer(3));
        let total = div.add(&modulo);
        assert_eq!(total.to_integer(), 4);
    }

    #[test]
    fn divide_by_zero_is_empty_and_falsy() {
        let zero = Record::integer(0);
        let x = Record::integer(0);
        let result = zero.div(&x);
        assert_eq!(*result.variant(), Variant::Empty);
        assert!(result.is_false());
    }

    #[test]
    fn numeric_promotion_to_double() {
        let a = Record::integer(3);
        let b = Record::double(2.0);
        let result = a.add(&b);
        assert!(matches!(result.variant(), Variant::Double(_)));
        assert_eq!(result.to_double(), 5.0);
    }

    #[test]
    fn string_coercion_failure_is_empty() {
        let a = Record::string("not a number");
        let b = Record::integer(1);
        let result = a.add(&b);
        assert_eq!(*result.variant(), Variant::Empty);
    }

    #[test]
    fn set_index_extends_array_with_zeros() {
        let mut r = Record::new();
        r.set_index(3, 42);
        assert_eq!(r.to_integers(), vec![0, 0, 0, 42]);
    }

    #[test]
    fn fragment_clamps_bounds() {
        let r = Record::string("hello world");
        let f = r.fragment(0, 4);
        assert_eq!(f.to_string(), "hello");
        let clamped = r.fragment(0, 1000);
        assert_eq!(clamped.to_string(), "hello world");
    }

    #[test]
    fn is_false_semantics() {
        assert!(Record::new().is_false());
        assert!(Record::integer(0).is_false());
        assert!(Record::string("").is_false());
        assert!(Record::integer_array(vec![]).is_false());
        assert!(!Record::integer(1).is_false());
        assert!(!Record::string("x").is_false());
    }

    #[test]
    fn read_file_infers_subtype_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"hi").unwrap();
        let r = Record::read_file(&path, None).unwrap();
        match r.variant() {
            Variant::Binary(bytes, subtype) => {
                assert_eq!(bytes, b"hi");
                assert_eq!(*subtype, BinarySubtype::Text);
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pose3d {
        x: f64,
    }

    impl any::AnyValue for Pose3d {
        fn tag(&self) -> &'static str {
            "pose3d"
        }
        fn serialize(&self) -> Vec<u8> {
            self.x.to_le_bytes().to_vec()
        }
        fn clone_box(&self) -> Box<dyn any::AnyValue> {
            Box::new(self.clone())
        }
        fn fmt_json(&self) -> serde_json::Value {
            serde_json::json!({"x": self.x})
        }
        fn eq_any(&self, other: &dyn any::AnyValue) -> bool {
            other.fmt_json().get("x").and_then(|v| v.as_f64()) == Some(self.x)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn as_any_returns_the_typed_value_when_tag_and_type_match() {
        any::register("pose3d_as_any_test", |bytes| {
            let arr: [u8; 8] = bytes.try_into().ok()?;
            Some(Box::new(Pose3d { x: f64::from_le_bytes(arr) }) as Box<dyn any::AnyValue>)
        });
        let mut record = Record::any(any::AnyPayload::Raw {
            tag: "pose3d_as_any_test".to_string(),
            bytes: 3.5f64.to_le_bytes().to_vec(),
        });
        let pose = record.as_any::<Pose3d>("pose3d_as_any_test").unwrap();
        assert_eq!(pose.x, 3.5);
    }

    #[test]
    fn as_any_reports_tag_mismatch_when_the_requested_tag_disagrees() {
        any::register("pose3d_as_any_test2", |bytes| {
            let arr: [u8; 8] = bytes.try_into().ok()?;
            Some(Box::new(Pose3d { x: f64::from_le_bytes(arr) }) as Box<dyn any::AnyValue>)
        });
        let mut record = Record::any(any::AnyPayload::Raw {
            tag: "pose3d_as_any_test2".to_string(),
            bytes: 1.0f64.to_le_bytes().to_vec(),
        });
        let err = record.as_any::<Pose3d>("some_other_tag").unwrap_err();
        assert!(matches!(err, crate::error::BadAnyAccess::TagMismatch { .. }));
    }

    #[test]
    fn as_any_reports_tag_mismatch_on_a_non_any_record() {
        let mut record = Record::integer(5);
        let err = record.as_any::<Pose3d>("pose3d").unwrap_err();
        assert!(matches!(err, crate::error::BadAnyAccess::TagMismatch { .. }));
    }
}
