//! Terminal rendering of decoded spans

use crate::tables::{ClassifiedSpan, LineSpan, ReferenceSpan};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Stdout stream honouring the `--no-color` flag
pub fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Parse a `#rrggbb` color
pub fn parse_color(value: &str) -> Option<Color> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// `index  start+length` prefix shared by every span line
fn print_position<W: WriteColor>(out: &mut W, index: usize, start: u32, length: u32) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{index:>6}")?;
    out.reset()?;
    write!(out, "  ")?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    write!(out, "{start}+{length}")?;
    out.reset()?;
    write!(out, "  ")
}

pub fn print_classified<W: WriteColor>(out: &mut W, index: usize, span: &ClassifiedSpan) -> io::Result<()> {
    print_position(out, index, span.start, span.length)?;

    let color = parse_color(&span.classification.default_color).unwrap_or(Color::Yellow);
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{}", span.classification.name)?;
    out.reset()?;

    if span.local_scope_id != 0 || span.local_scope_depth != 0 {
        write!(out, "  scope={} depth={}", span.local_scope_id, span.local_scope_depth)?;
    }
    writeln!(out)
}

pub fn print_reference<W: WriteColor>(
    out: &mut W,
    index: usize,
    span: &ReferenceSpan,
    line: Option<&LineSpan>,
) -> io::Result<()> {
    print_position(out, index, span.start, span.length)?;

    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(out, "{}::{}", span.symbol.project_id, span.symbol.symbol_id)?;
    out.reset()?;
    write!(out, " ({:?})", span.symbol.kind)?;

    if let Some(definition) = &span.related_definition {
        write!(out, " -> {definition}")?;
    }
    if span.exclude_from_search {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        write!(out, " [excluded]")?;
        out.reset()?;
    }
    writeln!(out)?;

    if let Some(line) = line {
        print_line(out, line)?;
    }
    Ok(())
}

/// Print the line text with the span highlighted
fn print_line<W: WriteColor>(out: &mut W, line: &LineSpan) -> io::Result<()> {
    let text = line.line.text.as_str();
    let column = line.start.saturating_sub(line.line.line_start) as usize;
    let end = column.saturating_add(line.length as usize);

    // Clamp to char boundaries so odd offsets never split a character
    let start = floor_char_boundary(text, column);
    let end = floor_char_boundary(text, end).max(start);

    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{:>8}", line.line.line_index + 1)?;
    out.reset()?;
    write!(out, ": {}", &text[..start])?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(out, "{}", &text[start..end])?;
    out.reset()?;
    writeln!(out, "{}", &text[end..])
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
