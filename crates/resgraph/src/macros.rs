//! KQL macro interpolation.
//!
//! Rewrites `$__name(args)` invocations into plain KQL. Matching is anchored
//! on the full call syntax and skips string literals, so a macro name quoted
//! inside `'...'`, `"..."` or a verbatim `@'...'` is left alone. Everything that is not a
//! recognized macro passes through byte for byte.
//!
//! Supported macros:
//! ```text
//! $__contains(col, v1, v2)   -> ['col'] in (v1, v2)      (`all` -> 1 == 1)
//! $__timeFilter()            -> ['TimeGenerated'] >= datetime(FROM) and ['TimeGenerated'] <= datetime(TO)
//! $__timeFilter(col)         -> same, on `col`
//! $__timeFrom()              -> datetime(FROM)
//! $__timeTo()                -> datetime(TO)
//! $__escapeMulti('a','b')    -> @'a', @'b'
//! ```

use crate::error::MacroError;
use crate::types::TimeRange;

const DEFAULT_TIME_COLUMN: &str = "TimeGenerated";

/// Interpolate every recognized macro in `query` over `range`.
pub fn interpolate(query: &str, range: &TimeRange) -> Result<String, MacroError> {
    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len());
    let mut i = 0;
    // Start of the pending verbatim run.
    let mut copied = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i, Literals::Kql);
            }
            b'$' if is_call_start(bytes, i) => {
                let name_start = i + 3;
                let mut name_end = name_start;
                while name_end < bytes.len() && is_ident_byte(bytes[name_end]) {
                    name_end += 1;
                }
                let name = &query[name_start..name_end];

                // Only rewrite macros we know; anything else is copied as-is.
                if !is_known(name) || bytes.get(name_end) != Some(&b'(') {
                    i = name_end.max(i + 1);
                    continue;
                }

                let literals = literals_for(name);
                let close = find_closing_paren(bytes, name_end, literals)
                    .ok_or(MacroError::Unterminated(i))?;
                let args = &query[name_end + 1..close];
                out.push_str(&query[copied..i]);
                out.push_str(&expand(name, args, range)?);
                i = close + 1;
                copied = i;
            }
            _ => i += 1,
        }
    }

    out.push_str(&query[copied..]);
    Ok(out)
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "contains" | "timeFilter" | "timeFrom" | "timeTo" | "escapeMulti"
    )
}

/// How quotes inside a macro's argument list are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Literals {
    /// KQL rules: backslash escapes, except in `@'...'` verbatim literals.
    Kql,
    /// Every literal is verbatim; `$__escapeMulti` values are raw text.
    Verbatim,
}

fn literals_for(name: &str) -> Literals {
    if name == "escapeMulti" {
        Literals::Verbatim
    } else {
        Literals::Kql
    }
}

fn expand(name: &str, raw_args: &str, range: &TimeRange) -> Result<String, MacroError> {
    let literals = literals_for(name);
    let args = split_args(raw_args, literals);
    match name {
        "contains" => {
            let column = args.first().copied().unwrap_or_default();
            if args.len() < 2 || column.is_empty() || args[1].is_empty() {
                return Err(MacroError::MissingArguments {
                    name: "$__contains",
                    expected: "a column and at least one value",
                });
            }
            if args.len() == 2 && args[1] == "all" {
                return Ok("1 == 1".to_string());
            }
            // Values are kept exactly as written, including their quoting.
            let values = top_level_comma(raw_args, literals)
                .map(|idx| raw_args[idx + 1..].trim())
                .unwrap_or_default();
            Ok(format!("['{column}'] in ({values})"))
        }
        "timeFilter" => {
            let column = match args.first() {
                Some(col) if !col.is_empty() => *col,
                _ => DEFAULT_TIME_COLUMN,
            };
            Ok(format!(
                "['{column}'] >= datetime('{}') and ['{column}'] <= datetime('{}')",
                range.from_literal(),
                range.to_literal()
            ))
        }
        "timeFrom" => Ok(format!("datetime('{}')", range.from_literal())),
        "timeTo" => Ok(format!("datetime('{}')", range.to_literal())),
        "escapeMulti" => {
            if args.iter().all(|a| a.is_empty()) {
                return Err(MacroError::MissingArguments {
                    name: "$__escapeMulti",
                    expected: "at least one value",
                });
            }
            let escaped: Vec<String> = args
                .iter()
                .filter(|a| !a.is_empty())
                .map(|a| {
                    if a.starts_with('\'') {
                        format!("@{a}")
                    } else {
                        format!("@'{a}'")
                    }
                })
                .collect();
            Ok(escaped.join(", "))
        }
        _ => unreachable!("is_known guards expand"),
    }
}

/// `$__` followed by an identifier start, not glued to a preceding identifier.
fn is_call_start(bytes: &[u8], i: usize) -> bool {
    if i > 0 && is_ident_byte(bytes[i - 1]) {
        return false;
    }
    bytes.get(i + 1) == Some(&b'_')
        && bytes.get(i + 2) == Some(&b'_')
        && bytes
            .get(i + 3)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Index just past the string literal opened at `start`.
///
/// Backslash escapes are honored unless the literal is verbatim (`@'...'`),
/// where a doubled quote stands for the quote itself. An unterminated
/// literal runs to the end.
fn skip_string(bytes: &[u8], start: usize, literals: Literals) -> usize {
    let quote = bytes[start];
    let verbatim = literals == Literals::Verbatim || (start > 0 && bytes[start - 1] == b'@');
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if !verbatim => i += 2,
            b if b == quote => {
                if verbatim && bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index of the `)` matching the `(` at `open`, ignoring parens in literals.
fn find_closing_paren(bytes: &[u8], open: usize, literals: Literals) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i, literals);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Byte offset of the first comma outside literals and nested parens.
fn top_level_comma(s: &str, literals: Literals) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i, literals);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on top-level commas and trim each argument.
fn split_args(raw: &str, literals: Literals) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = raw;
    while let Some(idx) = top_level_comma(rest, literals) {
        args.push(rest[..idx].trim());
        rest = &rest[idx + 1..];
    }
    args.push(rest.trim());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        let from = chrono::Utc.with_ymd_and_hms(2018, 3, 15, 13, 0, 0).unwrap();
        TimeRange::new(from, from + chrono::Duration::minutes(34))
    }

    #[test]
    fn test_contains() {
        let out = interpolate("resources | where $__contains(name,'res1','res2')", &range()).unwrap();
        assert_eq!(out, "resources | where ['name'] in ('res1','res2')");
    }

    #[test]
    fn test_contains_keeps_value_spacing_and_quoting() {
        let out = interpolate("$__contains( type , \"a\", 'b,c' )", &range()).unwrap();
        assert_eq!(out, "['type'] in (\"a\", 'b,c')");
    }

    #[test]
    fn test_contains_all() {
        let out = interpolate("resources | where $__contains(location, all)", &range()).unwrap();
        assert_eq!(out, "resources | where 1 == 1");
    }

    #[test]
    fn test_contains_missing_values() {
        let err = interpolate("$__contains(name)", &range()).unwrap_err();
        assert!(matches!(
            err,
            MacroError::MissingArguments {
                name: "$__contains",
                ..
            }
        ));
    }

    #[test]
    fn test_time_filter_default_and_custom_column() {
        let out = interpolate("T | where $__timeFilter()", &range()).unwrap();
        assert_eq!(
            out,
            "T | where ['TimeGenerated'] >= datetime('2018-03-15T13:00:00Z') and ['TimeGenerated'] <= datetime('2018-03-15T13:34:00Z')"
        );

        let out = interpolate("$__timeFilter(changeTime)", &range()).unwrap();
        assert_eq!(
            out,
            "['changeTime'] >= datetime('2018-03-15T13:00:00Z') and ['changeTime'] <= datetime('2018-03-15T13:34:00Z')"
        );
    }

    #[test]
    fn test_time_from_and_to() {
        let out = interpolate("between($__timeFrom() .. $__timeTo())", &range()).unwrap();
        assert_eq!(
            out,
            "between(datetime('2018-03-15T13:00:00Z') .. datetime('2018-03-15T13:34:00Z'))"
        );
    }

    #[test]
    fn test_escape_multi() {
        let out = interpolate(r"$__escapeMulti('\\vm\Network(eth0)\Total','\\hello')", &range()).unwrap();
        assert_eq!(out, r"@'\\vm\Network(eth0)\Total', @'\\hello'");
    }

    #[test]
    fn test_escape_multi_values_ending_in_backslash() {
        let out = interpolate(r"T | where Path in ($__escapeMulti('C:\','D:\'))", &range()).unwrap();
        assert_eq!(out, r"T | where Path in (@'C:\', @'D:\')");
    }

    #[test]
    fn test_verbatim_literal_does_not_escape() {
        let out = interpolate(
            r"resources | where path == @'C:\' and $__contains(name,'a')",
            &range(),
        )
        .unwrap();
        assert_eq!(out, r"resources | where path == @'C:\' and ['name'] in ('a')");

        let out = interpolate(r#"T | where p == @"D:\" | where $__timeFilter()"#, &range()).unwrap();
        assert!(out.starts_with(r#"T | where p == @"D:\" | where ['TimeGenerated'] >= "#), "{out}");
    }

    #[test]
    fn test_verbatim_literal_with_doubled_quote() {
        let out = interpolate("T | where n == @'it''s $__timeTo()' and t < $__timeTo()", &range()).unwrap();
        assert_eq!(
            out,
            "T | where n == @'it''s $__timeTo()' and t < datetime('2018-03-15T13:34:00Z')"
        );
    }

    #[test]
    fn test_escaped_quote_in_regular_literal() {
        let out = interpolate(r"T | where n == 'it\'s' and $__contains(n, 'x')", &range()).unwrap();
        assert_eq!(out, r"T | where n == 'it\'s' and ['n'] in ('x')");
    }

    #[test]
    fn test_macro_inside_string_literal_is_ignored() {
        let q = "resources | where name == '$__contains(name,1)' | project \"$__timeFrom()\"";
        assert_eq!(interpolate(q, &range()).unwrap(), q);
    }

    #[test]
    fn test_macro_glued_to_identifier_is_ignored() {
        let q = "my$__contains(name,'a')";
        assert_eq!(interpolate(q, &range()).unwrap(), q);
    }

    #[test]
    fn test_name_without_call_is_ignored() {
        let q = "resources | extend x = $__contains";
        assert_eq!(interpolate(q, &range()).unwrap(), q);
    }

    #[test]
    fn test_unknown_macro_passes_through() {
        let q = "resources | where $__custom(a, b) and $__contains(n, 'x')";
        assert_eq!(
            interpolate(q, &range()).unwrap(),
            "resources | where $__custom(a, b) and ['n'] in ('x')"
        );
    }

    #[test]
    fn test_unterminated_call() {
        let err = interpolate("resources | where $__contains(name, 'a'", &range()).unwrap_err();
        assert_eq!(err, MacroError::Unterminated(18));
    }

    #[test]
    fn test_interpolated_output_is_a_fixed_point() {
        let once = interpolate(
            "resources | where $__contains(name,'res1') and $__timeFilter(t)",
            &range(),
        )
        .unwrap();
        let twice = interpolate(&once, &range()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_ascii_text_is_preserved() {
        let q = "resources | where name == 'größe' | where $__contains(tag, 'ü')";
        assert_eq!(
            interpolate(q, &range()).unwrap(),
            "resources | where name == 'größe' | where ['tag'] in ('ü')"
        );
    }
}
