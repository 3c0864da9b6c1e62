#![deny(elided_lifetimes_in_paths)]
#![deny(unreachable_pub)]

//! Output escapers used by the stencil template engine.
//!
//! An [`Escaper`] writes a string with unsafe characters replaced. [`Html`]
//! covers HTML body/attribute contexts, [`Js`] escapes for embedding inside
//! JavaScript string literals.

use std::fmt::{self, Display, Formatter, Write};

pub trait Escaper {
    fn write_escaped<W>(&self, fmt: W, string: &str) -> fmt::Result
    where
        W: Write;
}

/// Wraps a string so that it displays escaped through the given escaper.
pub fn escape<E>(string: &str, escaper: E) -> Escaped<'_, E>
where
    E: Escaper,
{
    Escaped { string, escaper }
}

#[derive(Debug)]
pub struct Escaped<'a, E>
where
    E: Escaper,
{
    string: &'a str,
    escaper: E,
}

impl<E> Display for Escaped<'_, E>
where
    E: Escaper,
{
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        self.escaper.write_escaped(fmt, self.string)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Html;

impl Escaper for Html {
    fn write_escaped<W>(&self, mut fmt: W, string: &str) -> fmt::Result
    where
        W: Write,
    {
        let mut last = 0;
        for (index, byte) in string.bytes().enumerate() {
            let escaped = match byte {
                b'<' => Some("&lt;"),
                b'>' => Some("&gt;"),
                b'&' => Some("&amp;"),
                b'"' => Some("&quot;"),
                b'\'' => Some("&#39;"),
                _ => None,
            };
            if let Some(escaped) = escaped {
                fmt.write_str(&string[last..index])?;
                fmt.write_str(escaped)?;
                last = index + 1;
            }
        }
        fmt.write_str(&string[last..])
    }
}

/// Escapes a string for interpolation into a JavaScript string literal.
///
/// Control characters become `\u00XX`; backslashes and the characters that
/// could terminate a script context get fixed `\uXXXX` replacements.
#[derive(Debug, Clone, Copy)]
pub struct Js;

impl Escaper for Js {
    fn write_escaped<W>(&self, mut fmt: W, string: &str) -> fmt::Result
    where
        W: Write,
    {
        for c in string.chars() {
            let escaped = match c {
                '\\' => Some("\\u005C"),
                '&' => Some("\\u0026"),
                '<' => Some("\\u003C"),
                '>' => Some("\\u003E"),
                '\'' => Some("\\u0027"),
                '"' => Some("\\u0022"),
                '=' => Some("\\u003D"),
                '-' => Some("\\u002D"),
                ';' => Some("\\u003B"),
                _ => None,
            };
            match escaped {
                Some(escaped) => fmt.write_str(escaped)?,
                None if (c as u32) < 32 => write!(fmt, "\\u{:04X}", c as u32)?,
                None => fmt.write_char(c)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape("", Html).to_string(), "");
        assert_eq!(escape("<&>", Html).to_string(), "&lt;&amp;&gt;");
        assert_eq!(escape("bla&", Html).to_string(), "bla&amp;");
        assert_eq!(escape("<foo", Html).to_string(), "&lt;foo");
        assert_eq!(escape("bla&h", Html).to_string(), "bla&amp;h");
        assert_eq!(escape("\"'", Html).to_string(), "&quot;&#39;");
    }

    #[test]
    fn test_escape_js() {
        assert_eq!(escape("\"quoted\"", Js).to_string(), "\\u0022quoted\\u0022");
        assert_eq!(escape("a\nb", Js).to_string(), "a\\u000Ab");
        assert_eq!(escape("<script>", Js).to_string(), "\\u003Cscript\\u003E");
        assert_eq!(escape("x\\y", Js).to_string(), "x\\u005Cy");
    }
}
