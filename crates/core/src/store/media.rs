//! Media mutations. Filesystem side effects come first, so a failed disk
//! operation leaves the database untouched; the transaction only commits
//! once the disk already reflects the change.

use std::path::Path;

use rusqlite::params;
use tracing::{debug, warn};

use crate::domain::{MediaChange, MediaRecord};
use crate::error::{Error, Result};
use crate::hash::{self, PerceptualHash};

use super::{media_by_id_tx, media_from_row, tags, CacheDelta, Store};

impl Store {
    /// Catalog one new file. Tags in `add_tags` are resolved by label and
    /// created if unknown; `remove_tags` makes no sense on an insert and is
    /// rejected. A missing hash is computed from the file when possible.
    pub fn insert_media(&self, change: MediaChange) -> Result<MediaRecord> {
        if !change.remove_tags.is_empty() {
            return Err(Error::IllegalArgument(
                "cannot remove tags while inserting media".into(),
            ));
        }
        if change.path.as_os_str().is_empty() {
            return Err(Error::IllegalArgument("media path is empty".into()));
        }
        let hash = change.hash.or_else(|| hash::compute(&change.path));
        let path_str = change.path.to_string_lossy().into_owned();
        let added_at = chrono::Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let taken: Option<i64> = tx
            .query_row(
                "SELECT id FROM images WHERE path = ?1",
                params![path_str],
                |row| row.get(0),
            )
            .ok();
        if taken.is_some() {
            return Err(Error::FileAlreadyExists(change.path));
        }
        tx.execute(
            "INSERT INTO images (path, hash, added_at) VALUES (?1, ?2, ?3)",
            params![path_str, hash.map(|h| h.0 as i64), added_at],
        )?;
        let id = tx.last_insert_rowid();
        let mut delta = CacheDelta::default();
        tags::attach_tags(&tx, id, &change.add_tags, &mut delta)?;

        let mut caches = self.caches.write();
        tx.commit()?;
        delta.apply(&mut caches);
        debug!(id, path = %change.path.display(), "inserted media");
        Ok(MediaRecord {
            id,
            path: change.path,
            hash,
            added_at,
        })
    }

    /// Apply a change to an existing media item: path, hash, and tag set.
    /// Tags are removed before they are added, so a label on both sides ends
    /// up attached.
    pub fn update_media(&self, id: i64, change: MediaChange) -> Result<MediaRecord> {
        if change.path.as_os_str().is_empty() {
            return Err(Error::IllegalArgument("media path is empty".into()));
        }
        let path_str = change.path.to_string_lossy().into_owned();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current = media_by_id_tx(&tx, id)?;
        if current.path != change.path {
            let taken: Option<i64> = tx
                .query_row(
                    "SELECT id FROM images WHERE path = ?1 AND id <> ?2",
                    params![path_str, id],
                    |row| row.get(0),
                )
                .ok();
            if taken.is_some() {
                return Err(Error::FileAlreadyExists(change.path));
            }
        }
        tx.execute(
            "UPDATE images SET path = ?1, hash = ?2 WHERE id = ?3",
            params![path_str, change.hash.map(|h| h.0 as i64), id],
        )?;
        let mut delta = CacheDelta::default();
        tags::detach_tags(&tx, id, &change.remove_tags, &mut delta)?;
        tags::attach_tags(&tx, id, &change.add_tags, &mut delta)?;

        let mut caches = self.caches.write();
        tx.commit()?;
        delta.apply(&mut caches);
        Ok(MediaRecord {
            id,
            path: change.path,
            hash: change.hash,
            added_at: current.added_at,
        })
    }

    /// Replace just the stored hash, leaving everything else alone.
    pub fn update_media_hash(&self, id: i64, hash: Option<PerceptualHash>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        media_by_id_tx(&tx, id)?;
        tx.execute(
            "UPDATE images SET hash = ?1 WHERE id = ?2",
            params![hash.map(|h| h.0 as i64), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Move a file on disk and update its catalog path. Returns whether a
    /// file actually moved: a same-path call is a no-op, and a source that
    /// has already vanished still gets its catalog entry repointed.
    pub fn move_media(&self, record: &MediaRecord, new_path: &Path, overwrite: bool) -> Result<bool> {
        if record.path == new_path {
            return Ok(false);
        }
        if new_path.exists() && !overwrite {
            return Err(Error::FileAlreadyExists(new_path.to_path_buf()));
        }

        let moved = match std::fs::rename(&record.path, new_path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %record.path.display(), "move source missing, updating catalog only");
                false
            }
            Err(err) => return Err(Error::from_file_op(err, &record.path)),
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        media_by_id_tx(&tx, record.id)?;
        tx.execute(
            "UPDATE images SET path = ?1 WHERE id = ?2",
            params![new_path.to_string_lossy(), record.id],
        )?;
        tx.commit()?;
        debug!(id = record.id, to = %new_path.display(), moved, "moved media");
        Ok(moved)
    }

    /// Drop a media item from the catalog, optionally deleting the file.
    /// A file that is already gone from disk is not an error.
    pub fn delete_media(&self, record: &MediaRecord, from_disk: bool) -> Result<()> {
        if from_disk {
            match std::fs::remove_file(&record.path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::from_file_op(err, &record.path)),
            }
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let attached: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT tag_id FROM image_tag WHERE image_id = ?1")?;
            let ids = stmt
                .query_map(params![record.id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };
        tx.execute("DELETE FROM image_tag WHERE image_id = ?1", params![record.id])?;
        let changed = tx.execute("DELETE FROM images WHERE id = ?1", params![record.id])?;
        if changed == 0 {
            return Err(Error::ObjectDoesNotExist(format!("media {}", record.id)));
        }
        let mut delta = CacheDelta::default();
        for tag_id in attached {
            delta.bump(tag_id, -1);
        }

        let mut caches = self.caches.write();
        tx.commit()?;
        delta.apply(&mut caches);
        debug!(id = record.id, from_disk, "deleted media");
        Ok(())
    }

    /// Fold a duplicate into its keeper: the destination ends up with the
    /// union of both tag sets, then the source entry is deleted. The tag
    /// union and the deletion are separate transactions; if the deletion
    /// fails the union stays, which only ever over-tags the keeper.
    pub fn merge_media(
        &self,
        source_id: i64,
        dest_id: i64,
        delete_source_from_disk: bool,
    ) -> Result<MediaRecord> {
        if source_id == dest_id {
            return Err(Error::IllegalArgument("cannot merge media into itself".into()));
        }

        let source = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let source = media_by_id_tx(&tx, source_id)?;
            let dest = media_by_id_tx(&tx, dest_id)?;
            if source.path == dest.path {
                return Err(Error::IllegalArgument(
                    "cannot merge media sharing one path".into(),
                ));
            }
            let labels: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT t.label FROM tags t
                     JOIN image_tag it ON it.tag_id = t.id
                     WHERE it.image_id = ?1",
                )?;
                let labels = stmt
                    .query_map(params![source_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                labels
            };
            let mut delta = CacheDelta::default();
            tags::attach_tags(&tx, dest_id, &labels, &mut delta)?;

            let mut caches = self.caches.write();
            tx.commit()?;
            delta.apply(&mut caches);
            source
        };

        self.delete_media(&source, delete_source_from_disk)?;
        debug!(source_id, dest_id, "merged media");
        self.media(dest_id)
    }

    /// All stored media whose hash is within the similarity threshold of the
    /// given one, best match first, path as the tie-breaker. Unhashed media
    /// never match.
    pub fn similar_media(
        &self,
        hash: PerceptualHash,
        exclude: Option<i64>,
    ) -> Result<Vec<(MediaRecord, f32)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, hash, added_at, SIMILARITY_CONFIDENCE(hash, ?1) AS confidence
             FROM images
             WHERE SIMILAR_HASHES(hash, ?1) AND (?2 IS NULL OR id <> ?2)
             ORDER BY confidence DESC, path ASC",
        )?;
        let results = stmt
            .query_map(params![hash.0 as i64, exclude], |row| {
                Ok((media_from_row(row)?, row.get::<_, f64>(4)? as f32))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTag;
    use crate::hash::confidence_for_distance;

    #[test]
    fn test_insert_rejects_tag_removal() {
        let store = Store::open_in_memory().unwrap();
        let change = MediaChange::new("/pics/a.jpg").remove_tag("x");
        let err = store.insert_media(change).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn test_insert_rejects_duplicate_path() {
        let store = Store::open_in_memory().unwrap();
        store.insert_media(MediaChange::new("/pics/a.jpg")).unwrap();
        let err = store.insert_media(MediaChange::new("/pics/a.jpg")).unwrap_err();
        assert!(matches!(err, Error::FileAlreadyExists(_)));
    }

    #[test]
    fn test_insert_creates_unknown_tags_on_the_fly() {
        let store = Store::open_in_memory().unwrap();
        let record = store
            .insert_media(MediaChange::new("/pics/a.jpg").add_tag("new_tag"))
            .unwrap();
        let tag = store.tag_by_label("new_tag").unwrap();
        assert_eq!(tag.type_id, None);
        assert_eq!(store.tag_use_count(tag.id), 1);
        assert_eq!(store.media_tags(record.id).unwrap(), vec![tag]);
    }

    #[test]
    fn test_compound_tag_cannot_be_attached() {
        let store = Store::open_in_memory().unwrap();
        let mut compound = NewTag::new("favorites");
        compound.definition = Some("beach & sunset".into());
        store.insert_tags(&[compound]).unwrap();

        let err = store
            .insert_media(MediaChange::new("/pics/a.jpg").add_tag("favorites"))
            .unwrap_err();
        assert!(matches!(err, Error::BoundTagHasDefinition(_)));
        // the rejected insert must roll back entirely
        assert_eq!(store.media_count().unwrap(), 0);
    }

    #[test]
    fn test_update_media_retags_and_repaths() {
        let store = Store::open_in_memory().unwrap();
        let record = store
            .insert_media(MediaChange::new("/pics/a.jpg").add_tag("old"))
            .unwrap();

        let change = MediaChange::new("/pics/b.jpg")
            .add_tag("new")
            .remove_tag("old");
        let updated = store.update_media(record.id, change).unwrap();
        assert_eq!(updated.path, Path::new("/pics/b.jpg").to_path_buf());

        let labels: Vec<String> = store
            .media_tags(record.id)
            .unwrap()
            .into_iter()
            .map(|t| t.label)
            .collect();
        assert_eq!(labels, vec!["new"]);
        let old = store.tag_by_label("old").unwrap();
        assert_eq!(store.tag_use_count(old.id), 0);
    }

    #[test]
    fn test_update_media_detach_unknown_tag_fails() {
        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new("/pics/a.jpg")).unwrap();
        let change = MediaChange::new("/pics/a.jpg").remove_tag("never_seen");
        let err = store.update_media(record.id, change).unwrap_err();
        assert!(matches!(err, Error::ObjectDoesNotExist(_)));
    }

    #[test]
    fn test_move_media_same_path_is_noop() {
        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new("/pics/a.jpg")).unwrap();
        let moved = store
            .move_media(&record, Path::new("/pics/a.jpg"), false)
            .unwrap();
        assert!(!moved);
    }

    #[test]
    fn test_move_media_renames_file_and_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        std::fs::write(&src, b"payload").unwrap();

        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new(&src)).unwrap();
        let moved = store.move_media(&record, &dst, false).unwrap();
        assert!(moved);
        assert!(!src.exists());
        assert!(dst.exists());
        assert_eq!(store.media(record.id).unwrap().path, dst);
    }

    #[test]
    fn test_move_media_respects_overwrite_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        std::fs::write(&src, b"a").unwrap();
        std::fs::write(&dst, b"b").unwrap();

        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new(&src)).unwrap();
        let err = store.move_media(&record, &dst, false).unwrap_err();
        assert!(matches!(err, Error::FileAlreadyExists(_)));
        // catalog untouched after the refused move
        assert_eq!(store.media(record.id).unwrap().path, src);

        assert!(store.move_media(&record, &dst, true).unwrap());
        assert_eq!(std::fs::read(&dst).unwrap(), b"a");
    }

    #[test]
    fn test_move_media_tolerates_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("ghost.txt");
        let dst = tmp.path().join("moved.txt");

        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new(&src)).unwrap();
        let moved = store.move_media(&record, &dst, false).unwrap();
        assert!(!moved);
        assert_eq!(store.media(record.id).unwrap().path, dst);
    }

    #[test]
    fn test_delete_media_from_disk_and_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let record = store
            .insert_media(MediaChange::new(&file).add_tag("doomed"))
            .unwrap();
        store.delete_media(&record, true).unwrap();

        assert!(!file.exists());
        assert_eq!(store.media_count().unwrap(), 0);
        let tag = store.tag_by_label("doomed").unwrap();
        assert_eq!(store.tag_use_count(tag.id), 0);

        // deleting again: file already gone is fine, catalog entry is not
        let err = store.delete_media(&record, true).unwrap_err();
        assert!(matches!(err, Error::ObjectDoesNotExist(_)));
    }

    #[test]
    fn test_merge_media_unions_tags_and_drops_source() {
        let store = Store::open_in_memory().unwrap();
        let source = store
            .insert_media(MediaChange::new("/pics/dup.jpg").add_tag("x").add_tag("y"))
            .unwrap();
        let dest = store
            .insert_media(MediaChange::new("/pics/keep.jpg").add_tag("y").add_tag("z"))
            .unwrap();

        let merged = store.merge_media(source.id, dest.id, false).unwrap();
        let labels: Vec<String> = store
            .media_tags(merged.id)
            .unwrap()
            .into_iter()
            .map(|t| t.label)
            .collect();
        assert_eq!(labels, vec!["x", "y", "z"]);
        assert!(store.media(source.id).is_err());

        // shared tag y is attached exactly once
        let y = store.tag_by_label("y").unwrap();
        assert_eq!(store.tag_use_count(y.id), 1);
    }

    #[test]
    fn test_merge_media_into_itself_fails() {
        let store = Store::open_in_memory().unwrap();
        let record = store.insert_media(MediaChange::new("/pics/a.jpg")).unwrap();
        let err = store.merge_media(record.id, record.id, false).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn test_similar_media_ordering_and_exclusion() {
        let store = Store::open_in_memory().unwrap();
        let base = PerceptualHash(0);
        let self_record = store
            .insert_media(MediaChange::new("/pics/self.jpg").with_hash(base))
            .unwrap();
        // distance 2 twice (tie broken by path) and distance 5 once
        store
            .insert_media(MediaChange::new("/pics/b.jpg").with_hash(PerceptualHash(0b11)))
            .unwrap();
        store
            .insert_media(MediaChange::new("/pics/a.jpg").with_hash(PerceptualHash(0b101)))
            .unwrap();
        store
            .insert_media(MediaChange::new("/pics/far.jpg").with_hash(PerceptualHash(0b11111)))
            .unwrap();
        // beyond threshold and unhashed: never returned
        store
            .insert_media(MediaChange::new("/pics/other.jpg").with_hash(PerceptualHash(u64::MAX)))
            .unwrap();
        store.insert_media(MediaChange::new("/pics/nohash.jpg")).unwrap();

        let results = store.similar_media(base, Some(self_record.id)).unwrap();
        let paths: Vec<_> = results
            .iter()
            .map(|(r, _)| r.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, vec!["/pics/a.jpg", "/pics/b.jpg", "/pics/far.jpg"]);
        assert!((results[0].1 - confidence_for_distance(2)).abs() < 1e-6);
        assert!(results[0].1 >= results[1].1 && results[1].1 >= results[2].1);
    }
}
