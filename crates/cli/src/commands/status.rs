use anyhow::Result;
use tagvault_core::{pseudo, Store};

pub fn run(store: &Store) -> Result<()> {
    let media_count = store.media_count()?;
    let tags = store.tags();
    let types = store.tag_types();
    let compound = tags.iter().filter(|t| t.is_compound()).count();

    let unhashed = count_pseudo(store, "no_hash")?;
    let videos = count_pseudo(store, "video")?;

    println!();
    println!("  TagVault Status");
    println!("  ===============");
    println!();
    println!("   Media:      {media_count:>8}        Videos:    {videos:>8}");
    println!(
        "   Unhashed:   {unhashed:>8}        Tags:      {:>8}",
        tags.len()
    );
    println!(
        "   Compound:   {compound:>8}        Types:     {:>8}",
        types.len()
    );
    println!();
    Ok(())
}

fn count_pseudo(store: &Store, name: &str) -> Result<usize> {
    let Some(pseudo_tag) = pseudo::lookup(name) else {
        return Ok(0);
    };
    let sql = pseudo_tag.expand(None, "")?;
    Ok(store.search(&sql)?.len())
}
