use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tagvault_core::{hash, pseudo, Store};

/// Show catalogued media similar to the given file. A catalogued path is
/// matched by its stored hash (and excluded from its own results); anything
/// else is hashed on the spot.
pub fn similar(store: &Store, path: PathBuf) -> Result<()> {
    let (file_hash, exclude) = match store.media_by_path(&path)? {
        Some(record) => (record.hash, Some(record.id)),
        None => (hash::compute(&path), None),
    };
    let Some(file_hash) = file_hash else {
        bail!("no perceptual hash available for {}", path.display());
    };

    let matches = store.similar_media(file_hash, exclude)?;
    if matches.is_empty() {
        println!("No similar media.");
        return Ok(());
    }
    for (record, confidence) in matches {
        println!("{:>5.1}%  {}", confidence * 100.0, record.path.display());
    }
    Ok(())
}

/// Expand a pseudo-tag and run it as a query.
pub fn find(store: &Store, name: &str, argument: Option<&str>, flags: &str) -> Result<()> {
    let pseudo_tag =
        pseudo::lookup(name).ok_or_else(|| anyhow!("unknown pseudo-tag '{name}'"))?;
    let sql = pseudo_tag.expand(argument, flags)?;
    let results = store.search(&sql)?;
    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for record in results {
        println!("{:>6}  {}", record.id, record.path.display());
    }
    Ok(())
}
