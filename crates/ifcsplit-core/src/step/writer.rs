//! STEP writer.

use super::StepHeader;
use crate::graph::{Entity, EntityId, Value};
use std::fmt::Write as _;
use std::io::{self, Write};

/// Write a complete STEP document.
///
/// References for which `keep` returns false are pruned from the written
/// text: dropped from lists, `$` in scalar slots. Returns the number of
/// pruned references.
pub fn write_document<'a, W, I, F>(
    out: &mut W,
    header: &StepHeader,
    entities: I,
    keep: F,
) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Entity>,
    F: Fn(EntityId) -> bool,
{
    let encoding = header.encoding();
    let mut write_line = |line: &str| -> io::Result<()> {
        out.write_all(&encoding.encode(line))?;
        out.write_all(b"\n")
    };

    write_line("ISO-10303-21;")?;
    write_line("HEADER;")?;
    for statement in header.statements() {
        write_line(&format!("{};", statement))?;
    }
    write_line("ENDSEC;")?;
    write_line("DATA;")?;

    let mut pruned = 0;
    for entity in entities {
        if entity.references().all(&keep) {
            write_line(&format_entity(entity))?;
        } else {
            let mut copy = entity.clone();
            for value in copy.attributes.iter_mut() {
                pruned += value.prune_references(&keep);
            }
            write_line(&format_entity(&copy))?;
        }
    }

    write_line("ENDSEC;")?;
    write_line("END-ISO-10303-21;")?;
    Ok(pruned)
}

/// Format one instance line, e.g. `#5=IFCCARTESIANPOINT((0.,0.,0.));`
pub fn format_entity(entity: &Entity) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(line, "#{}={}(", entity.id.0, entity.type_tag);
    for (i, value) in entity.attributes.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        push_value(&mut line, value);
    }
    line.push_str(");");
    line
}

fn push_value(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push('$'),
        Value::Derived => buf.push('*'),
        Value::Integer(i) => {
            let _ = write!(buf, "{}", i);
        }
        Value::Real(r) => buf.push_str(&format_real(*r)),
        Value::String(s) => {
            buf.push('\'');
            buf.push_str(&s.replace('\'', "''"));
            buf.push('\'');
        }
        Value::Enum(e) => {
            let _ = write!(buf, ".{}.", e);
        }
        Value::Binary(b) => {
            let _ = write!(buf, "\"{}\"", b);
        }
        Value::Ref(id) => {
            let _ = write!(buf, "#{}", id.0);
        }
        Value::List(items) => {
            buf.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                push_value(buf, item);
            }
            buf.push(')');
        }
        Value::Typed { tag, value } => {
            let _ = write!(buf, "{}(", tag);
            push_value(buf, value);
            buf.push(')');
        }
    }
}

/// Format a real the STEP way: always a decimal point, exponent as `E`.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.".to_string();
    }
    let text = format!("{:?}", value);
    let (mantissa, exponent) = match text.split_once('e') {
        Some((m, e)) => (m, Some(e)),
        None => (text.as_str(), None),
    };
    let mut out = mantissa.strip_suffix(".0").map_or_else(
        || mantissa.to_string(),
        |integral| format!("{}.", integral),
    );
    if !out.contains('.') {
        out.push('.');
    }
    if let Some(exponent) = exponent {
        out.push('E');
        out.push_str(exponent);
    }
    out
}
