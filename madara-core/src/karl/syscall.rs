//! System-call table (spec §4.3 "System calls"). `lookup` is used by
//! `prune` to validate names/arities at compile time; `call` is the
//! runtime dispatcher used by `eval`.

use crate::context::Context;
use crate::record::{BinarySubtype, Record};
use std::path::Path;

pub struct SysCallSpec {
    pub name: &'static str,
    pub arities: &'static [usize],
    pub arity_description: &'static str,
}

const TABLE: &[SysCallSpec] = &[
    SysCallSpec { name: "expand_statement", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "fragment", arities: &[3], arity_description: "3" },
    SysCallSpec { name: "set_precision", arities: &[0, 1], arity_description: "0 or 1" },
    SysCallSpec { name: "set_fixed", arities: &[0], arity_description: "0" },
    SysCallSpec { name: "set_scientific", arities: &[0], arity_description: "0" },
    SysCallSpec { name: "read_file", arities: &[1, 2], arity_description: "1 or 2" },
    SysCallSpec { name: "write_file", arities: &[2], arity_description: "2" },
    SysCallSpec { name: "size", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_integer", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_double", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_integers", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_doubles", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_string", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "to_buffer", arities: &[1], arity_description: "1" },
    SysCallSpec { name: "print", arities: &[1], arity_description: "1" },
];

pub fn lookup(name: &str) -> Option<&'static SysCallSpec> {
    TABLE.iter().find(|s| s.name == name)
}

fn subtype_from_hint(hint: &str) -> BinarySubtype {
    match hint.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => BinarySubtype::Jpeg,
        "text" | "txt" => BinarySubtype::Text,
        "xml" => BinarySubtype::Xml,
        _ => BinarySubtype::UnknownFile,
    }
}

/// Runtime dispatch. `name` is assumed already looked up; an unknown name
/// or bad arity here (dynamically injected args) is a runtime error: log
/// and return `Empty`, per spec §4.3/§7.
pub fn call(name: &str, args: &[Record], ctx: &Context) -> Record {
    let Some(spec) = lookup(name) else {
        tracing::warn!(syscall = name, "call to unknown system call at runtime");
        return Record::new();
    };
    if !spec.arities.contains(&args.len()) {
        tracing::warn!(
            syscall = name,
            got = args.len(),
            expected = spec.arity_description,
            "system call arity mismatch at runtime"
        );
        return Record::new();
    }

    match name {
        "expand_statement" => match ctx.expand_statement(&args[0].to_string()) {
            Ok(expanded) => Record::string(expanded),
            Err(err) => {
                tracing::warn!(error = %err, "expand_statement failed");
                Record::new()
            }
        },
        "fragment" => args[0].fragment(args[1].to_integer(), args[2].to_integer()),
        "set_precision" => match args.first() {
            Some(n) => Record::integer(crate::record::precision::set_precision(n.to_integer())),
            None => Record::integer(crate::record::precision::get_precision()),
        },
        "set_fixed" => {
            crate::record::precision::set_fixed();
            Record::new()
        }
        "set_scientific" => {
            crate::record::precision::set_scientific();
            Record::new()
        }
        "read_file" => {
            let path = args[0].to_string();
            let hint = args.get(1).map(|h| subtype_from_hint(&h.to_string()));
            match Record::read_file(Path::new(&path), hint) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(path, error = %err, "#read_file failed");
                    Record::new()
                }
            }
        }
        "write_file" => {
            let path = args[1].to_string();
            match args[0].write_file(Path::new(&path)) {
                Ok(()) => Record::integer(0),
                Err(err) => {
                    tracing::warn!(path, error = %err, "#write_file failed");
                    Record::integer(-1)
                }
            }
        }
        "size" => Record::integer(args[0].size() as i64),
        "to_integer" => Record::integer(args[0].to_integer()),
        "to_double" => Record::double(args[0].to_double()),
        "to_integers" => Record::integer_array(args[0].to_integers()),
        "to_doubles" => Record::double_array(args[0].to_doubles()),
        "to_string" => Record::string(args[0].to_string()),
        "to_buffer" => match args[0].variant() {
            crate::record::Variant::Binary(bytes, subtype) => Record::binary(bytes.clone(), *subtype),
            _ => Record::binary(args[0].to_string().into_bytes(), BinarySubtype::Raw),
        },
        "print" => {
            let expanded = match ctx.expand_statement(&args[0].to_string()) {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "#print: expand_statement failed");
                    args[0].to_string()
                }
            };
            tracing::info!(target: "karl::print", "{}", expanded);
            Record::string(expanded)
        }
        _ => unreachable!("system call table entry without a dispatch arm"),
    }
}
