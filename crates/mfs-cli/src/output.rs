//! Terminal rendering of engine results.

use std::io::{self, Write};

use mfs_core::{ListOptions, ListRow};

const NAME_WIDTH: usize = 65;
const SIZE_WIDTH: usize = 15;
const TIME_WIDTH: usize = 25;
const FLAG_WIDTH: usize = 15;

/// Print a directory listing, or `No files found.` when `rows` is empty.
pub fn write_listing<W: Write>(out: &mut W, rows: &[ListRow], options: ListOptions) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "No files found.");
    }

    write!(
        out,
        "{:<NAME_WIDTH$}{:<SIZE_WIDTH$}{:<TIME_WIDTH$}",
        "Directory List", "Byte Size", "Time"
    )?;
    if options.show_attributes {
        write!(out, "{:<FLAG_WIDTH$}{:<FLAG_WIDTH$}", "Hidden", "Read Only")?;
    }
    writeln!(out)?;

    for row in rows {
        write!(
            out,
            "{:<NAME_WIDTH$}{:<SIZE_WIDTH$}{:<TIME_WIDTH$}",
            row.name,
            row.file_size,
            row.created()
        )?;
        if let Some(flags) = row.flags {
            write!(
                out,
                "{:<FLAG_WIDTH$}{:<FLAG_WIDTH$}",
                u8::from(flags.hidden),
                u8::from(flags.readonly)
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
