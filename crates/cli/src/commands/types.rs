use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tagvault_core::{NewTagType, Store};

pub fn list(store: &Store) -> Result<()> {
    let types = store.tag_types();
    if types.is_empty() {
        println!("No tag types.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Label"),
        Cell::new("Symbol"),
        Cell::new("Color"),
        Cell::new("Uses"),
    ]);
    for tag_type in &types {
        table.add_row(vec![
            Cell::new(tag_type.id),
            Cell::new(&tag_type.label),
            Cell::new(tag_type.symbol),
            Cell::new(format!("#{:06x}", tag_type.color)),
            Cell::new(store.tag_type_use_count(tag_type.id)),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn add(store: &Store, label: String, symbol: char, color: &str) -> Result<()> {
    let color = parse_color(color)?;
    let types = store.insert_tag_types(&[NewTagType {
        label,
        symbol,
        color,
    }])?;
    println!(
        "Added tag type {} '{}' ({})",
        types[0].id, types[0].label, types[0].symbol
    );
    Ok(())
}

pub fn rm(store: &Store, id: i64) -> Result<()> {
    store.delete_tag_types(&[id])?;
    println!("Removed tag type {id} (its tags are now untyped)");
    Ok(())
}

fn parse_color(color: &str) -> Result<u32> {
    let hex = color.trim_start_matches('#');
    match u32::from_str_radix(hex, 16) {
        Ok(value) if value <= 0xFFFFFF => Ok(value),
        _ => bail!("invalid color '{color}', expected hex RGB like ff8800"),
    }
}
