//! Human-readable KaRL dump: one `name = value;` assignment per line.

use crate::record::{Record, Variant};
use std::fmt::Write as _;

fn literal(record: &Record) -> String {
    match record.variant() {
        Variant::Empty => "0".to_string(),
        Variant::Integer(n) => n.to_string(),
        Variant::Double(d) => d.to_string(),
        Variant::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Variant::IntegerArray(a) => {
            let parts: Vec<String> = a.iter().map(|n| n.to_string()).collect();
            format!("[{}]", parts.join(","))
        }
        Variant::DoubleArray(a) => {
            let parts: Vec<String> = a.iter().map(|n| n.to_string()).collect();
            format!("[{}]", parts.join(","))
        }
        Variant::Binary(bytes, _) => format!("#to_buffer('{}')", hex(bytes)),
        Variant::Any(payload) => format!("'{}'", payload.tag()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Renders `records` as a sequence of KaRL assignment statements, sorted
/// by name for deterministic output.
pub fn save_as_karl(records: &[(String, Record)]) -> String {
    let mut sorted: Vec<&(String, Record)> = records.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    for (name, record) in sorted {
        let _ = writeln!(out, "{} = {};", name, literal(record));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_scalars_and_arrays() {
        let records = vec![
            (".local".to_string(), Record::integer(3)),
            ("global.name".to_string(), Record::string("hi")),
            ("arr".to_string(), Record::integer_array(vec![1, 2, 3])),
        ];
        let text = save_as_karl(&records);
        assert!(text.contains(".local = 3;\n"));
        assert!(text.contains("arr = [1,2,3];\n"));
        assert!(text.contains("global.name = 'hi';\n"));
    }

    #[test]
    fn escapes_single_quotes_in_strings() {
        let records = vec![("s".to_string(), Record::string("it's"))];
        let text = save_as_karl(&records);
        assert_eq!(text, "s = 'it\\'s';\n");
    }
}
