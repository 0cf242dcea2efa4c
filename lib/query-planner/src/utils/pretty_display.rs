use std::fmt::{Formatter as FmtFormatter, Result as FmtResult};

pub fn get_indent(depth: usize) -> String {
    "  ".repeat(depth)
}

pub trait PrettyDisplay {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult;
}

/// `[id, name, balance]`
pub fn write_field_list(f: &mut FmtFormatter<'_>, fields: &[String]) -> FmtResult {
    write!(f, "[{}]", fields.join(", "))
}
