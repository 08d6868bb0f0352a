//! Built-in pseudo-tags: virtual tags whose meaning is a SQL fragment over
//! the `images` table rather than a stored attachment. A query compiler
//! resolves a pseudo-tag by name and splices the expanded SQL into the
//! statement it is building.
//!
//! Flags are boolean properties of the file itself; pattern tags take one
//! argument plus optional match flags (`i` case-insensitive, `s` force
//! case-sensitive, sensitive by default).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub enum PseudoTagKind {
    /// No argument; the SQL stands on its own.
    Flag { sql: &'static str },
    /// One argument substituted into the template. `accepts_regex` tags
    /// treat it as a regex for the REGEX function; the rest take a literal.
    Pattern {
        template: &'static str,
        accepts_regex: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct PseudoTag {
    pub name: &'static str,
    pub kind: PseudoTagKind,
}

/// The whole registry. Adding a pseudo-tag means adding a row here and, if
/// it needs one, a scalar function in `store::functions`.
pub const PSEUDO_TAGS: &[PseudoTag] = &[
    PseudoTag {
        name: "no_file",
        kind: PseudoTagKind::Flag {
            sql: "SELECT id FROM images WHERE NOT FILE_EXISTS(path)",
        },
    },
    PseudoTag {
        name: "no_tags",
        kind: PseudoTagKind::Flag {
            sql: "SELECT id FROM images WHERE id NOT IN (SELECT image_id FROM image_tag)",
        },
    },
    PseudoTag {
        name: "no_hash",
        kind: PseudoTagKind::Flag {
            sql: "SELECT id FROM images WHERE hash IS NULL",
        },
    },
    PseudoTag {
        name: "video",
        kind: PseudoTagKind::Flag {
            sql: "SELECT id FROM images WHERE IS_VIDEO(path)",
        },
    },
    PseudoTag {
        name: "ext",
        kind: PseudoTagKind::Pattern {
            template: "SELECT id FROM images WHERE RINSTR(path, '.') > 0 \
                       AND REGEX(SUBSTR(path, RINSTR(path, '.') + 1), '%s', '%s')",
            accepts_regex: true,
        },
    },
    PseudoTag {
        name: "name",
        kind: PseudoTagKind::Pattern {
            template: "SELECT id FROM images \
                       WHERE REGEX(SUBSTR(path, RINSTR(path, '/') + 1), '%s', '%s')",
            accepts_regex: true,
        },
    },
    PseudoTag {
        name: "path",
        kind: PseudoTagKind::Pattern {
            template: "SELECT id FROM images WHERE REGEX(path, '%s', '%s')",
            accepts_regex: true,
        },
    },
    PseudoTag {
        name: "similar_to",
        kind: PseudoTagKind::Pattern {
            template: "SELECT id FROM images WHERE SIMILAR_HASHES(hash, \
                       (SELECT hash FROM images WHERE path = '%s' LIMIT 1))",
            accepts_regex: false,
        },
    },
];

pub fn lookup(name: &str) -> Option<&'static PseudoTag> {
    PSEUDO_TAGS.iter().find(|p| p.name == name)
}

impl PseudoTag {
    /// Expand into a SQL fragment selecting matching image ids.
    pub fn expand(&self, argument: Option<&str>, flags: &str) -> Result<String> {
        if !flags.chars().all(|c| c == 'i' || c == 's') {
            return Err(Error::IllegalArgument(format!(
                "unknown match flags '{flags}'"
            )));
        }
        match self.kind {
            PseudoTagKind::Flag { sql } => {
                if argument.is_some() {
                    return Err(Error::IllegalArgument(format!(
                        "pseudo-tag '{}' takes no argument",
                        self.name
                    )));
                }
                Ok(sql.to_string())
            }
            PseudoTagKind::Pattern {
                template,
                accepts_regex,
            } => {
                let argument = argument.ok_or_else(|| {
                    Error::IllegalArgument(format!(
                        "pseudo-tag '{}' requires an argument",
                        self.name
                    ))
                })?;
                let escaped = sql_escape(argument);
                if accepts_regex {
                    Ok(fill_slots(template, &[&escaped, resolve_flags(flags)]))
                } else {
                    Ok(fill_slots(template, &[&escaped]))
                }
            }
        }
    }
}

/// Literal text inside single quotes: SQLite doubles embedded quotes.
fn sql_escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// Fill the template's `%s` slots left to right. Substituted values are
/// never rescanned, so an argument containing `%s` passes through intact.
fn fill_slots(template: &str, values: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    for value in values {
        match rest.split_once("%s") {
            Some((head, tail)) => {
                out.push_str(head);
                out.push_str(value);
                rest = tail;
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn resolve_flags(flags: &str) -> &'static str {
    if !flags.contains('s') && flags.contains('i') {
        "i"
    } else {
        ""
    }
}
