//! Scalar SQL functions backing compiled queries and pseudo-tag expansions.
//!
//! Every function here is total: bad input types, NULLs, and unparseable
//! regex patterns degrade to the no-match value (false / 0 / 0.0) instead of
//! aborting the statement. A query over a half-populated store must never
//! fail because one row is odd.

use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::domain;
use crate::error::Result;
use crate::hash::{confidence_for_distance, PerceptualHash};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Register all scalar functions on a connection. Called once at open, before
/// any statement can reference them.
pub fn register(conn: &Connection) -> Result<()> {
    let det = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("REGEX", 3, det, regex_match)?;
    conn.create_scalar_function("RINSTR", 2, det, rinstr)?;
    conn.create_scalar_function("IS_VIDEO", 1, det, |ctx| {
        Ok(path_arg(ctx, 0).is_some_and(|p| domain::is_video(&p)))
    })?;
    conn.create_scalar_function("SIMILAR_HASHES", 2, det, |ctx| {
        Ok(match (hash_arg(ctx, 0), hash_arg(ctx, 1)) {
            (Some(a), Some(b)) => a.is_similar_to(b),
            _ => false,
        })
    })?;
    conn.create_scalar_function("SIMILARITY_CONFIDENCE", 2, det, |ctx| {
        Ok(match (hash_arg(ctx, 0), hash_arg(ctx, 1)) {
            (Some(a), Some(b)) => confidence_for_distance(a.distance(b)) as f64,
            _ => 0.0,
        })
    })?;

    // Consults the filesystem, so never marked deterministic.
    conn.create_scalar_function("FILE_EXISTS", 1, FunctionFlags::SQLITE_UTF8, |ctx| {
        Ok(path_arg(ctx, 0).is_some_and(|p| p.exists()))
    })?;

    Ok(())
}

/// REGEX(value, pattern, flags): whole-string match.
///
/// The compiled regex is cached as auxiliary data on the pattern argument, so
/// a statement scanning thousands of rows compiles it once. A pattern that
/// fails to compile caches as `None` and matches nothing.
fn regex_match(ctx: &Context<'_>) -> rusqlite::Result<bool> {
    let case_insensitive = text_arg(ctx, 2).is_some_and(|flags| flags_case_insensitive(&flags));

    let compiled: Arc<Option<Regex>> =
        ctx.get_or_create_aux(1, |vr| -> std::result::Result<_, BoxError> {
            Ok(vr
                .as_str()
                .ok()
                .and_then(|pattern| compile_whole_match(pattern, case_insensitive)))
        })?;

    let Some(re) = compiled.as_ref() else {
        return Ok(false);
    };
    match ctx.get_raw(0).as_str() {
        Ok(value) => Ok(re.is_match(value)),
        Err(_) => Ok(false),
    }
}

/// RINSTR(value, needle): 1-based character index of the LAST occurrence of
/// needle in value, 0 when absent. The reverse of SQLite's INSTR, so
/// `SUBSTR(path, RINSTR(path, '.') + 1)` yields a file extension.
fn rinstr(ctx: &Context<'_>) -> rusqlite::Result<i64> {
    let (Some(value), Some(needle)) = (text_arg(ctx, 0), text_arg(ctx, 1)) else {
        return Ok(0);
    };
    if needle.is_empty() {
        return Ok(0);
    }
    Ok(match value.rfind(&needle) {
        Some(byte_idx) => value[..byte_idx].chars().count() as i64 + 1,
        None => 0,
    })
}

fn compile_whole_match(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\A(?:{pattern})\z"))
        .case_insensitive(case_insensitive)
        .build()
        .ok()
}

/// `s` (force-sensitive) beats `i`; no flags means case-sensitive.
fn flags_case_insensitive(flags: &str) -> bool {
    !flags.contains('s') && flags.contains('i')
}

fn text_arg(ctx: &Context<'_>, idx: usize) -> Option<String> {
    ctx.get_raw(idx).as_str().ok().map(str::to_owned)
}

fn path_arg(ctx: &Context<'_>, idx: usize) -> Option<std::path::PathBuf> {
    text_arg(ctx, idx).map(|s| Path::new(&s).to_path_buf())
}

fn hash_arg(ctx: &Context<'_>, idx: usize) -> Option<PerceptualHash> {
    match ctx.get_raw(idx) {
        ValueRef::Integer(v) => Some(PerceptualHash(v as u64)),
        _ => None,
    }
}
