use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tagvault_core::{NewTag, Store};

pub fn list(store: &Store) -> Result<()> {
    let tags = store.tags();
    if tags.is_empty() {
        println!("No tags.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Label"),
        Cell::new("Type"),
        Cell::new("Uses"),
        Cell::new("Definition"),
    ]);
    for tag in &tags {
        let type_label = tag
            .type_id
            .and_then(|id| store.tag_type(id))
            .map(|t| format!("{} {}", t.symbol, t.label))
            .unwrap_or_else(|| "\u{2014}".to_string());
        table.add_row(vec![
            Cell::new(tag.id),
            Cell::new(&tag.label),
            Cell::new(type_label),
            Cell::new(store.tag_use_count(tag.id)),
            Cell::new(tag.definition.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn add(
    store: &Store,
    label: String,
    type_id: Option<i64>,
    definition: Option<String>,
) -> Result<()> {
    let tags = store.insert_tags(&[NewTag {
        label,
        type_id,
        definition,
    }])?;
    let kind = if tags[0].is_compound() { "compound tag" } else { "tag" };
    println!("Added {kind} {} '{}'", tags[0].id, tags[0].label);
    Ok(())
}

pub fn rm(store: &Store, id: i64) -> Result<()> {
    store.delete_tags(&[id])?;
    println!("Removed tag {id}");
    Ok(())
}
