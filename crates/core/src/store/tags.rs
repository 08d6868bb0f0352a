//! Tag-type and tag mutations, plus the attach/detach helpers the media
//! paths share. All writes follow the same shape: validate up front, run one
//! transaction, take the cache write lock, commit, then fold the prepared
//! delta into the caches.

use rusqlite::{params, Transaction};
use tracing::debug;

use crate::domain::{self, NewTag, NewTagType, Tag, TagType};
use crate::error::{Error, Result};

use super::{tag_by_label_tx, CacheDelta, Store};

impl Store {
    // ── Tag types ────────────────────────────────────────────────────

    pub fn insert_tag_types(&self, new_types: &[NewTagType]) -> Result<Vec<TagType>> {
        for new_type in new_types {
            domain::validate_type_label(&new_type.label)?;
            domain::validate_type_symbol(new_type.symbol)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(new_types.len());
        for new_type in new_types {
            ensure_type_label_free(&tx, &new_type.label, None)?;
            ensure_type_symbol_free(&tx, new_type.symbol, None)?;
            tx.execute(
                "INSERT INTO tag_types (label, symbol, color) VALUES (?1, ?2, ?3)",
                params![
                    new_type.label,
                    new_type.symbol.to_string(),
                    new_type.color as i64
                ],
            )?;
            inserted.push(TagType {
                id: tx.last_insert_rowid(),
                label: new_type.label.clone(),
                symbol: new_type.symbol,
                color: new_type.color,
            });
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for tag_type in &inserted {
            caches.tag_type_use_counts.insert(tag_type.id, 0);
            caches.tag_types.insert(tag_type.id, tag_type.clone());
        }
        debug!(count = inserted.len(), "inserted tag types");
        Ok(inserted)
    }

    pub fn update_tag_types(&self, updates: &[TagType]) -> Result<()> {
        for update in updates {
            domain::validate_type_label(&update.label)?;
            domain::validate_type_symbol(update.symbol)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for update in updates {
            ensure_type_exists(&tx, update.id)?;
            ensure_type_label_free(&tx, &update.label, Some(update.id))?;
            ensure_type_symbol_free(&tx, update.symbol, Some(update.id))?;
            tx.execute(
                "UPDATE tag_types SET label = ?1, symbol = ?2, color = ?3 WHERE id = ?4",
                params![
                    update.label,
                    update.symbol.to_string(),
                    update.color as i64,
                    update.id
                ],
            )?;
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for update in updates {
            caches.tag_types.insert(update.id, update.clone());
        }
        Ok(())
    }

    /// Delete tag types. Tags of a deleted type survive, untyped.
    pub fn delete_tag_types(&self, ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for &id in ids {
            ensure_type_exists(&tx, id)?;
            tx.execute("UPDATE tags SET type_id = NULL WHERE type_id = ?1", params![id])?;
            tx.execute("DELETE FROM tag_types WHERE id = ?1", params![id])?;
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for id in ids {
            caches.tag_types.remove(id);
            caches.tag_type_use_counts.remove(id);
            for tag in caches.tags.values_mut() {
                if tag.type_id == Some(*id) {
                    tag.type_id = None;
                }
            }
        }
        debug!(count = ids.len(), "deleted tag types");
        Ok(())
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub fn insert_tags(&self, new_tags: &[NewTag]) -> Result<Vec<Tag>> {
        for new_tag in new_tags {
            domain::validate_tag_label(&new_tag.label)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(new_tags.len());
        for new_tag in new_tags {
            ensure_tag_label_free(&tx, &new_tag.label, None)?;
            if let Some(type_id) = new_tag.type_id {
                ensure_type_exists(&tx, type_id)?;
            }
            let definition = domain::normalize_definition(new_tag.definition.clone());
            tx.execute(
                "INSERT INTO tags (label, type_id, definition) VALUES (?1, ?2, ?3)",
                params![new_tag.label, new_tag.type_id, definition],
            )?;
            inserted.push(Tag {
                id: tx.last_insert_rowid(),
                label: new_tag.label.clone(),
                type_id: new_tag.type_id,
                definition,
            });
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for tag in &inserted {
            caches.tag_use_counts.insert(tag.id, 0);
            caches.tags.insert(tag.id, tag.clone());
        }
        debug!(count = inserted.len(), "inserted tags");
        Ok(inserted)
    }

    /// Update tags in one transaction. Giving a tag a definition while it is
    /// still attached to media is rejected: a tag is either attachable or a
    /// stored query, never both.
    pub fn update_tags(&self, updates: &[Tag]) -> Result<()> {
        for update in updates {
            domain::validate_tag_label(&update.label)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        // (id, old type, new type, use count) for the cache cascade
        let mut applied = Vec::with_capacity(updates.len());
        for update in updates {
            let current = tag_by_id_tx(&tx, update.id)?;
            ensure_tag_label_free(&tx, &update.label, Some(update.id))?;
            if let Some(type_id) = update.type_id {
                ensure_type_exists(&tx, type_id)?;
            }
            let definition = domain::normalize_definition(update.definition.clone());
            let use_count = tag_use_count_tx(&tx, update.id)?;
            if definition.is_some() && use_count > 0 {
                return Err(Error::BoundTagHasDefinition(update.label.clone()));
            }
            tx.execute(
                "UPDATE tags SET label = ?1, type_id = ?2, definition = ?3 WHERE id = ?4",
                params![update.label, update.type_id, definition, update.id],
            )?;
            applied.push((
                Tag {
                    id: update.id,
                    label: update.label.clone(),
                    type_id: update.type_id,
                    definition,
                },
                current.type_id,
                use_count,
            ));
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for (tag, old_type, use_count) in applied {
            if old_type != tag.type_id && use_count > 0 {
                if let Some(old) = old_type {
                    *caches.tag_type_use_counts.entry(old).or_insert(0) -= use_count;
                }
                if let Some(new) = tag.type_id {
                    *caches.tag_type_use_counts.entry(new).or_insert(0) += use_count;
                }
            }
            caches.tags.insert(tag.id, tag);
        }
        Ok(())
    }

    /// Delete tags, detaching them from all media first.
    pub fn delete_tags(&self, ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            let tag = tag_by_id_tx(&tx, id)?;
            let use_count = tag_use_count_tx(&tx, id)?;
            tx.execute("DELETE FROM image_tag WHERE tag_id = ?1", params![id])?;
            tx.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
            removed.push((tag, use_count));
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        for (tag, use_count) in removed {
            caches.tags.remove(&tag.id);
            caches.tag_use_counts.remove(&tag.id);
            if let Some(type_id) = tag.type_id {
                if use_count > 0 {
                    *caches.tag_type_use_counts.entry(type_id).or_insert(0) -= use_count;
                }
            }
        }
        debug!(count = ids.len(), "deleted tags");
        Ok(())
    }
}

// ── In-transaction helpers ──────────────────────────────────────────

fn ensure_type_exists(tx: &Transaction, id: i64) -> Result<()> {
    let exists: Option<i64> = tx
        .query_row("SELECT id FROM tag_types WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .ok();
    match exists {
        Some(_) => Ok(()),
        None => Err(Error::ObjectDoesNotExist(format!("tag type {id}"))),
    }
}

fn ensure_type_label_free(tx: &Transaction, label: &str, except: Option<i64>) -> Result<()> {
    let taken: Option<i64> = tx
        .query_row(
            "SELECT id FROM tag_types WHERE label = ?1",
            params![label],
            |row| row.get(0),
        )
        .ok();
    match taken {
        Some(id) if Some(id) != except => Err(Error::DuplicateLabel(label.to_string())),
        _ => Ok(()),
    }
}

fn ensure_type_symbol_free(tx: &Transaction, symbol: char, except: Option<i64>) -> Result<()> {
    let taken: Option<i64> = tx
        .query_row(
            "SELECT id FROM tag_types WHERE symbol = ?1",
            params![symbol.to_string()],
            |row| row.get(0),
        )
        .ok();
    match taken {
        Some(id) if Some(id) != except => Err(Error::DuplicateSymbol(symbol.to_string())),
        _ => Ok(()),
    }
}

fn ensure_tag_label_free(tx: &Transaction, label: &str, except: Option<i64>) -> Result<()> {
    // label column collates NOCASE, so this also catches case variants
    let taken: Option<i64> = tx
        .query_row("SELECT id FROM tags WHERE label = ?1", params![label], |row| {
            row.get(0)
        })
        .ok();
    match taken {
        Some(id) if Some(id) != except => Err(Error::DuplicateLabel(label.to_string())),
        _ => Ok(()),
    }
}

fn tag_by_id_tx(tx: &Transaction, id: i64) -> Result<Tag> {
    tx.query_row(
        "SELECT id, label, type_id, definition FROM tags WHERE id = ?1",
        params![id],
        super::tag_from_row,
    )
    .map_err(|_| Error::ObjectDoesNotExist(format!("tag {id}")))
}

fn tag_use_count_tx(tx: &Transaction, id: i64) -> Result<i64> {
    Ok(tx.query_row(
        "SELECT COUNT(*) FROM image_tag WHERE tag_id = ?1",
        params![id],
        |row| row.get(0),
    )?)
}

/// Attach tags by label to one media item. Unknown labels are created on the
/// fly (untyped, no definition); labels naming a compound tag are rejected;
/// labels already attached are left alone.
pub(crate) fn attach_tags(
    tx: &Transaction,
    image_id: i64,
    labels: &[String],
    delta: &mut CacheDelta,
) -> Result<()> {
    for label in labels {
        let tag = match tag_by_label_tx(tx, label)? {
            Some(tag) => {
                if tag.is_compound() {
                    return Err(Error::BoundTagHasDefinition(tag.label));
                }
                tag
            }
            None => {
                domain::validate_tag_label(label)?;
                tx.execute(
                    "INSERT INTO tags (label, type_id, definition) VALUES (?1, NULL, NULL)",
                    params![label],
                )?;
                let tag = Tag {
                    id: tx.last_insert_rowid(),
                    label: label.clone(),
                    type_id: None,
                    definition: None,
                };
                delta.new_tags.push(tag.clone());
                tag
            }
        };
        let changed = tx.execute(
            "INSERT OR IGNORE INTO image_tag (image_id, tag_id) VALUES (?1, ?2)",
            params![image_id, tag.id],
        )?;
        if changed > 0 {
            delta.bump(tag.id, 1);
        }
    }
    Ok(())
}

/// Detach tags by label from one media item. Unknown labels are an error;
/// labels not attached to this item are a no-op.
pub(crate) fn detach_tags(
    tx: &Transaction,
    image_id: i64,
    labels: &[String],
    delta: &mut CacheDelta,
) -> Result<()> {
    for label in labels {
        let tag = tag_by_label_tx(tx, label)?
            .ok_or_else(|| Error::ObjectDoesNotExist(format!("tag '{label}'")))?;
        let changed = tx.execute(
            "DELETE FROM image_tag WHERE image_id = ?1 AND tag_id = ?2",
            params![image_id, tag.id],
        )?;
        if changed > 0 {
            delta.bump(tag.id, -1);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaChange;

    fn people_type() -> NewTagType {
        NewTagType {
            label: "People".into(),
            symbol: '@',
            color: 0x3366FF,
        }
    }

    #[test]
    fn test_insert_and_update_tag_types() {
        let store = Store::open_in_memory().unwrap();
        let types = store.insert_tag_types(&[people_type()]).unwrap();
        assert_eq!(types.len(), 1);

        let mut updated = types[0].clone();
        updated.label = "Persons".into();
        updated.color = 0xFF0000;
        store.update_tag_types(&[updated.clone()]).unwrap();
        assert_eq!(store.tag_type(types[0].id), Some(updated));
    }

    #[test]
    fn test_duplicate_type_symbol_rejected_and_rolled_back() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .insert_tag_types(&[
                people_type(),
                NewTagType {
                    label: "Places".into(),
                    symbol: '@',
                    color: 0,
                },
            ])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol(_)));
        // the first entry of the batch must not survive the rollback
        assert!(store.tag_types().is_empty());
    }

    #[test]
    fn test_invalid_symbol_fails_before_any_write() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .insert_tag_types(&[NewTagType {
                label: "Broken".into(),
                symbol: 'x',
                color: 0,
            }])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSymbol(_)));
        assert!(store.tag_types().is_empty());
    }

    #[test]
    fn test_delete_tag_type_detaches_tags() {
        let store = Store::open_in_memory().unwrap();
        let types = store.insert_tag_types(&[people_type()]).unwrap();
        let mut tag = NewTag::new("alice");
        tag.type_id = Some(types[0].id);
        let tags = store.insert_tags(&[tag]).unwrap();

        store.delete_tag_types(&[types[0].id]).unwrap();
        assert!(store.tag_type(types[0].id).is_none());
        let survivor = store.tag(tags[0].id).unwrap();
        assert_eq!(survivor.type_id, None);
    }

    #[test]
    fn test_tag_label_uniqueness_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tags(&[NewTag::new("Sunset")]).unwrap();
        let err = store.insert_tags(&[NewTag::new("sunset")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel(_)));
    }

    #[test]
    fn test_insert_tag_with_unknown_type_fails() {
        let store = Store::open_in_memory().unwrap();
        let mut tag = NewTag::new("orphan");
        tag.type_id = Some(999);
        let err = store.insert_tags(&[tag]).unwrap_err();
        assert!(matches!(err, Error::ObjectDoesNotExist(_)));
        assert!(store.tags().is_empty());
    }

    #[test]
    fn test_update_tag_rejects_definition_while_attached() {
        let store = Store::open_in_memory().unwrap();
        let tags = store.insert_tags(&[NewTag::new("beach")]).unwrap();
        store
            .insert_media(MediaChange::new("/pics/a.jpg").add_tag("beach"))
            .unwrap();

        let mut update = tags[0].clone();
        update.definition = Some("sunset & sea".into());
        let err = store.update_tags(&[update]).unwrap_err();
        assert!(matches!(err, Error::BoundTagHasDefinition(_)));

        // once detached the same update goes through
        let record = store.media_by_path(std::path::Path::new("/pics/a.jpg")).unwrap().unwrap();
        let change = MediaChange::new("/pics/a.jpg").remove_tag("beach");
        store.update_media(record.id, change).unwrap();
        let mut update = tags[0].clone();
        update.definition = Some("sunset & sea".into());
        store.update_tags(&[update]).unwrap();
        assert!(store.tag(tags[0].id).unwrap().is_compound());
    }

    #[test]
    fn test_use_counts_cascade_to_types() {
        let store = Store::open_in_memory().unwrap();
        let types = store.insert_tag_types(&[people_type()]).unwrap();
        let mut tag = NewTag::new("bob");
        tag.type_id = Some(types[0].id);
        let tags = store.insert_tags(&[tag]).unwrap();

        store
            .insert_media(MediaChange::new("/pics/1.jpg").add_tag("bob"))
            .unwrap();
        store
            .insert_media(MediaChange::new("/pics/2.jpg").add_tag("bob"))
            .unwrap();
        assert_eq!(store.tag_use_count(tags[0].id), 2);
        assert_eq!(store.tag_type_use_count(types[0].id), 2);

        // retyping the tag moves its weight to the new type
        let other = store
            .insert_tag_types(&[NewTagType {
                label: "Pets".into(),
                symbol: '&',
                color: 0,
            }])
            .unwrap();
        let mut update = tags[0].clone();
        update.type_id = Some(other[0].id);
        store.update_tags(&[update]).unwrap();
        assert_eq!(store.tag_type_use_count(types[0].id), 0);
        assert_eq!(store.tag_type_use_count(other[0].id), 2);
    }

    #[test]
    fn test_delete_tag_updates_counts_and_detaches() {
        let store = Store::open_in_memory().unwrap();
        let types = store.insert_tag_types(&[people_type()]).unwrap();
        let mut tag = NewTag::new("carol");
        tag.type_id = Some(types[0].id);
        let tags = store.insert_tags(&[tag]).unwrap();
        let record = store
            .insert_media(MediaChange::new("/pics/c.jpg").add_tag("carol"))
            .unwrap();

        store.delete_tags(&[tags[0].id]).unwrap();
        assert!(store.tag(tags[0].id).is_none());
        assert_eq!(store.tag_type_use_count(types[0].id), 0);
        assert!(store.media_tags(record.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_tag_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = store.delete_tags(&[42]).unwrap_err();
        assert!(matches!(err, Error::ObjectDoesNotExist(_)));
    }
}
