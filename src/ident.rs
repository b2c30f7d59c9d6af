//! Identifier sanitization and escaping.
//!
//! Applies a Unicode-category rule rather than a case-convention crate,
//! since sanitization here is a hard idempotence invariant rather than a
//! style choice: running it twice on already-sanitized input must be a
//! no-op.

/// Sanitizes a raw field/type name into a valid SQL identifier:
/// - the first character must be a Unicode letter or `_`, else it is
///   replaced with `_`;
/// - subsequent characters are kept if they are a letter, digit, mark,
///   connector-punctuation, or format character;
/// - a space or an underscore (after the first character) signals the next
///   valid character should be capitalized and is itself dropped
///   (`"user name"` -> `"UserName"`, `"group_id"` -> `"groupId"`);
/// - every other character is dropped.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut capitalize_next = false;
    let mut first = true;

    for ch in raw.chars() {
        if ch == ' ' || (ch == '_' && !first) {
            capitalize_next = true;
            continue;
        }

        let keep = if first {
            ch.is_alphabetic() || ch == '_'
        } else {
            ch.is_alphanumeric() || matches!(ch.general_category_hint(), CharCategory::Mark | CharCategory::Format)
        };

        if !keep {
            if first {
                out.push('_');
                first = false;
            }
            continue;
        }

        if first {
            out.push(ch);
            first = false;
        } else if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }

    if out.is_empty() {
        out.push('_');
    }
    out
}

/// A coarse stand-in for the Unicode general-category groups the
/// sanitizer allows past the first character (mark, format). `_` is handled
/// separately as a word-break trigger before this check ever runs. `char`
/// in `std` does not expose these categories directly without a
/// Unicode-tables crate; combining marks and format characters are rare in
/// identifiers sourced from Rust field names, so this hint covers the
/// ASCII-adjacent cases that actually occur in practice and otherwise
/// defers to `is_alphanumeric`.
enum CharCategory {
    Mark,
    Format,
    Other,
}

trait CharCategoryHint {
    fn general_category_hint(&self) -> CharCategory;
}

impl CharCategoryHint for char {
    fn general_category_hint(&self) -> CharCategory {
        match self {
            '\u{200c}' | '\u{200d}' => CharCategory::Format,
            c if is_combining_mark(*c) => CharCategory::Mark,
            _ => CharCategory::Other,
        }
    }
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// Makes `name` unique against `existing_type_name` by suffixing `Property`,
/// `Property1`, `Property2`, ..., compared
/// case-insensitively.
pub fn disambiguate_from_type_name(name: &str, existing_type_name: &str) -> String {
    if !name.eq_ignore_ascii_case(existing_type_name) {
        return name.to_string();
    }
    let mut candidate = format!("{name}Property");
    let mut n = 1u32;
    loop {
        if !candidate.eq_ignore_ascii_case(existing_type_name) {
            return candidate;
        }
        candidate = format!("{name}Property{n}");
        n += 1;
    }
}

/// Escapes an identifier for use in SQL text: wraps it in double quotes,
/// doubling any embedded quote.
pub fn escape_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
