use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    let bold = std::io::IsTerminal::is_terminal(&std::io::stderr());
    for line in md.lines() {
        if bold && line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
    return;
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is one,
/// how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigNotFound { path } => format!(
            "\
# Error: Config Not Found

`{}` does not exist.

## Fix

Check the `--config` path, or omit it to use `dtxmend.toml` in the working directory.
",
            path.display()
        ),
        Error::DescriptorNotFound { path } => format!(
            "\
# Error: Descriptor Not Found

`{}` is listed by the set descriptor but does not exist.

## Fix

Restore the chart file, or remove its line from the set descriptor.
",
            path.display()
        ),
        Error::PackageNotFound { name, songs_root } => format!(
            "\
# Error: Package Not Found

No package directory `{name}` in `{}`.

## Fix

`--song` takes a directory name under the songs directory. List them with:

    dtxmend check
",
            songs_root.display()
        ),
        Error::SetDescriptorAbsent { package } => format!(
            "\
# Error: Set Descriptor Absent

`{}` has no set descriptor.

## Fix

Add a `set.def` listing the package's charts, or set `set_file_name` in `dtxmend.toml`.
",
            package.display()
        ),
        Error::SongsDirectoryNotFound { path } => format!(
            "\
# Error: Songs Directory Not Found

`{}` is not a directory.

## Fix

Set `songs_directory` in `dtxmend.toml`, or pass it directly:

    dtxmend --songs path/to/songs check
",
            path.display()
        ),
        Error::UndecodableContent { path } => format!(
            "\
# Error: Undecodable Descriptor

`{}` is neither Shift_JIS nor UTF-16LE text with a `#TITLE` line.

## Fix

Re-save the file as Shift_JIS or UTF-16LE and make sure it has a `#TITLE` line.
",
            path.display()
        ),
        Error::UnresolvedReference { key, reason, song, value } => format!(
            "\
# Error: Unresolved Reference

`{key}` in song {song} points at `{value}`, which does not exist ({reason}).

## Fix

Run `dtxmend fix` without `--no-prompt` to choose a replacement, or edit the value by hand.
"
        ),
        Error::Io(_)
        | Error::JsonSer(_)
        | Error::Pattern(_)
        | Error::TomlDe(_)
        | Error::Walk(_) => render_generic(e),
    };
}

/// One-paragraph diagnostic for errors wrapped from other crates.
fn render_generic(e: &Error) -> String {
    let title = match e {
        Error::Io(_) => "I/O",
        Error::JsonSer(_) => "JSON Serialization",
        Error::Pattern(_) => "Invalid Pattern",
        Error::TomlDe(_) => "Invalid TOML",
        Error::Walk(_) => "Directory Traversal",
        _ => "Unexpected",
    };
    return format!("# Error: {title}\n\n{e}\n");
}
