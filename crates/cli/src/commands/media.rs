use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tagvault_core::{MediaChange, MediaRecord, Store};

pub fn add(store: &Store, path: PathBuf, tags: Vec<String>) -> Result<()> {
    let mut change = MediaChange::new(path);
    change.add_tags = tags;
    let record = store.insert_media(change)?;
    let hashed = if record.hash.is_some() { "hashed" } else { "no hash" };
    println!("Added media {} {} ({hashed})", record.id, record.path.display());
    Ok(())
}

pub fn rm(store: &Store, id: i64, from_disk: bool) -> Result<()> {
    let record = store.media(id)?;
    store.delete_media(&record, from_disk)?;
    if from_disk {
        println!("Removed {} and deleted the file", record.path.display());
    } else {
        println!("Removed {} from the catalog", record.path.display());
    }
    Ok(())
}

pub fn mv(store: &Store, id: i64, new_path: PathBuf, overwrite: bool) -> Result<()> {
    let record = store.media(id)?;
    let moved = store.move_media(&record, &new_path, overwrite)?;
    if moved {
        println!("Moved {} -> {}", record.path.display(), new_path.display());
    } else {
        println!("Catalog now points at {}", new_path.display());
    }
    Ok(())
}

pub fn merge(store: &Store, source: i64, dest: i64, delete_source: bool) -> Result<()> {
    let merged = store.merge_media(source, dest, delete_source)?;
    let labels = tag_labels(store, merged.id)?;
    println!(
        "Merged media {source} into {dest}; tags now: {}",
        labels.join(", ")
    );
    Ok(())
}

pub fn tag(store: &Store, id: i64, labels: Vec<String>) -> Result<()> {
    let record = store.media(id)?;
    let mut change = retag_change(&record);
    change.add_tags = labels;
    store.update_media(id, change)?;
    println!("Tags on {}: {}", record.path.display(), tag_labels(store, id)?.join(", "));
    Ok(())
}

pub fn untag(store: &Store, id: i64, labels: Vec<String>) -> Result<()> {
    let record = store.media(id)?;
    let mut change = retag_change(&record);
    change.remove_tags = labels;
    store.update_media(id, change)?;
    println!("Tags on {}: {}", record.path.display(), tag_labels(store, id)?.join(", "));
    Ok(())
}

pub fn ls(store: &Store) -> Result<()> {
    let records = store.all_media()?;
    if records.is_empty() {
        println!("No media.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Path"),
        Cell::new("Hash"),
        Cell::new("Tags"),
    ]);
    for record in &records {
        let hash = record
            .hash
            .map(|h| format!("{:016x}", h.0))
            .unwrap_or_else(|| "\u{2014}".to_string());
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(record.path.display()),
            Cell::new(hash),
            Cell::new(tag_labels(store, record.id)?.join(", ")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn show(store: &Store, id: i64) -> Result<()> {
    let record = store.media(id)?;
    println!("Media {}", record.id);
    println!("  Path:     {}", record.path.display());
    println!("  Added:    {}", record.added_at);
    match record.hash {
        Some(hash) => println!("  Hash:     {:016x}", hash.0),
        None => println!("  Hash:     none"),
    }
    let tags = store.media_tags(id)?;
    if tags.is_empty() {
        println!("  Tags:     none");
    } else {
        for tag in tags {
            let symbol = tag
                .type_id
                .and_then(|tid| store.tag_type(tid))
                .map(|t| t.symbol.to_string())
                .unwrap_or_default();
            println!("  Tag:      {symbol}{}", tag.label);
        }
    }
    Ok(())
}

/// A change that keeps path and hash as they are, ready for tag edits.
fn retag_change(record: &MediaRecord) -> MediaChange {
    let mut change = MediaChange::new(record.path.clone());
    change.hash = record.hash;
    change
}

fn tag_labels(store: &Store, id: i64) -> Result<Vec<String>> {
    Ok(store
        .media_tags(id)?
        .into_iter()
        .map(|t| t.label)
        .collect())
}
