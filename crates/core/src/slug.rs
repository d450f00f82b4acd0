//! Slug rules for recorrido and step identifiers.
//!
//! Every recorrido id, step id and choice id is a technical slug:
//! lowercase letters, digits and underscores, starting with a letter,
//! 3 to 64 characters for top-level ids. Slugs are validated before any
//! store write.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;

/// Minimum length for a recorrido id.
pub const MIN_SLUG_LEN: usize = 3;

/// Maximum length for a recorrido id.
pub const MAX_SLUG_LEN: usize = 64;

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-z][a-z0-9_]*$").expect("valid slug regex"))
}

/// Check whether a string matches the slug shape (no length limits).
///
/// Used for step ids and choice ids, which have no minimum length.
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty() && slug_pattern().is_match(s)
}

/// Validate a recorrido id: slug shape plus the 3..=64 length window.
pub fn validate_slug_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::Validation("El ID es requerido".into()));
    }
    if id.len() < MIN_SLUG_LEN {
        return Err(CoreError::Validation(
            "El ID debe tener al menos 3 caracteres".into(),
        ));
    }
    if id.len() > MAX_SLUG_LEN {
        return Err(CoreError::Validation(
            "El ID no puede tener más de 64 caracteres".into(),
        ));
    }
    if !slug_pattern().is_match(id) {
        return Err(CoreError::Validation(
            "El ID solo puede contener letras minúsculas, números y guiones bajos. \
             Debe empezar con letra."
                .into(),
        ));
    }
    Ok(())
}

/// Generate a technical slug from free text.
///
/// Lowercases, folds common accented characters, replaces whitespace and
/// dashes with underscores, strips everything else, collapses repeated
/// underscores and truncates to [`MAX_SLUG_LEN`].
pub fn generate_slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_underscore = true; // suppress leading underscores

    for ch in text.to_lowercase().chars() {
        let ch = fold_accent(ch);
        match ch {
            'a'..='z' | '0'..='9' => {
                out.push(ch);
                last_was_underscore = false;
            }
            ' ' | '\t' | '\n' | '-' | '_' => {
                if !last_was_underscore {
                    out.push('_');
                    last_was_underscore = true;
                }
            }
            _ => {}
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out.truncate(MAX_SLUG_LEN);
    out
}

/// Map accented vowels and ñ/ç to their ASCII base letter; other chars pass
/// through unchanged.
fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}
