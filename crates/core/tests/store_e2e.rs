//! End-to-end tests driving a real on-disk store with real image files.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use tagvault_core::{
    hash, import_directory, pseudo, Error, MediaChange, NewTag, NewTagType, Store,
};

/// Write a small gradient JPEG; `seed` shifts the gradient so different
/// seeds produce clearly different hashes.
fn create_jpeg(path: &Path, seed: u8) {
    let img = image::RgbImage::from_fn(64, 64, |x, y| {
        image::Rgb([
            seed.wrapping_add((x * 3) as u8),
            seed.wrapping_add((y * 3) as u8),
            seed,
        ])
    });
    img.save(path).unwrap();
}

/// A checkerboard hashes far away from any smooth gradient.
fn create_checkerboard(path: &Path) {
    let img = image::RgbImage::from_fn(64, 64, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    img.save(path).unwrap();
}

#[test]
fn identical_files_hash_identically_with_top_confidence() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.jpg");
    let b = tmp.path().join("b.jpg");
    create_jpeg(&a, 40);
    create_jpeg(&b, 40);

    let hash_a = hash::compute(&a).unwrap();
    let hash_b = hash::compute(&b).unwrap();
    let (distance, confidence) = hash::similarity(hash_a, hash_b);
    assert_eq!(distance, 0);
    assert!(confidence > 0.98 && confidence < 1.0);
}

#[test]
fn import_then_find_similar_pairs() {
    let tmp = tempfile::tempdir().unwrap();
    let pics = tmp.path().join("pics");
    std::fs::create_dir(&pics).unwrap();
    create_jpeg(&pics.join("original.jpg"), 40);
    create_jpeg(&pics.join("copy.jpg"), 40);
    create_checkerboard(&pics.join("unrelated.jpg"));

    let store = Store::open(&tmp.path().join("vault.db")).unwrap();
    let cancel = AtomicBool::new(false);
    assert_eq!(import_directory(&store, &pics, &cancel, None).unwrap(), 3);

    let original = store
        .media_by_path(&pics.join("original.jpg"))
        .unwrap()
        .unwrap();
    let matches = store
        .similar_media(original.hash.unwrap(), Some(original.id))
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].0.path, pics.join("copy.jpg"));
    assert!(matches[0].1 > 0.98);
}

#[test]
fn tagging_workflow_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("vault.db");

    {
        let store = Store::open(&db).unwrap();
        let types = store
            .insert_tag_types(&[NewTagType {
                label: "Places".into(),
                symbol: '#',
                color: 0x00AA55,
            }])
            .unwrap();
        let mut tag = NewTag::new("lisbon");
        tag.type_id = Some(types[0].id);
        store.insert_tags(&[tag]).unwrap();
        store
            .insert_media(MediaChange::new("/pics/tram.jpg").add_tag("lisbon"))
            .unwrap();
    }

    let store = Store::open(&db).unwrap();
    let tag = store.tag_by_label("lisbon").unwrap();
    assert_eq!(store.tag_use_count(tag.id), 1);
    let tag_type = store.tag_type(tag.type_id.unwrap()).unwrap();
    assert_eq!(tag_type.label, "Places");
    assert_eq!(store.tag_type_use_count(tag_type.id), 1);
}

#[test]
fn failed_write_leaves_store_and_caches_untouched() {
    let store = Store::open_in_memory().unwrap();
    store.insert_tags(&[NewTag::new("existing")]).unwrap();

    // second entry collides, so the whole batch must vanish
    let err = store
        .insert_tags(&[NewTag::new("fresh"), NewTag::new("EXISTING")])
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateLabel(_)));
    assert!(store.tag_by_label("fresh").is_none());
    assert_eq!(store.tags().len(), 1);
}

#[test]
fn compound_tags_are_queries_not_attachments() {
    let store = Store::open_in_memory().unwrap();
    let mut compound = NewTag::new("holiday");
    compound.definition = Some("beach | mountains".into());
    store.insert_tags(&[compound]).unwrap();

    let err = store
        .insert_media(MediaChange::new("/pics/a.jpg").add_tag("holiday"))
        .unwrap_err();
    assert!(matches!(err, Error::BoundTagHasDefinition(_)));

    // and the other direction: an attached tag cannot gain a definition
    store
        .insert_media(MediaChange::new("/pics/b.jpg").add_tag("beach"))
        .unwrap();
    let mut beach = store.tag_by_label("beach").unwrap();
    beach.definition = Some("anything".into());
    let err = store.update_tags(&[beach]).unwrap_err();
    assert!(matches!(err, Error::BoundTagHasDefinition(_)));
}

#[test]
fn merge_deletes_source_file_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let keep = tmp.path().join("keep.jpg");
    let dup = tmp.path().join("dup.jpg");
    create_jpeg(&keep, 40);
    create_jpeg(&dup, 40);

    let store = Store::open(&tmp.path().join("vault.db")).unwrap();
    let kept = store
        .insert_media(MediaChange::new(&keep).add_tag("keeper"))
        .unwrap();
    let doomed = store
        .insert_media(MediaChange::new(&dup).add_tag("dupe"))
        .unwrap();

    let merged = store.merge_media(doomed.id, kept.id, true).unwrap();
    assert!(!dup.exists());
    assert!(keep.exists());
    let labels: Vec<String> = store
        .media_tags(merged.id)
        .unwrap()
        .into_iter()
        .map(|t| t.label)
        .collect();
    assert_eq!(labels, vec!["dupe", "keeper"]);
    assert!(store.media(doomed.id).is_err());
}

#[test]
fn pseudo_tag_search_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&tmp.path().join("vault.db")).unwrap();
    store.insert_media(MediaChange::new("/pics/IMG.PNG")).unwrap();
    store.insert_media(MediaChange::new("/pics/shot.jpg")).unwrap();
    store.insert_media(MediaChange::new("/pics/clip.mp4")).unwrap();

    let sql = pseudo::lookup("ext")
        .unwrap()
        .expand(Some("png"), "i")
        .unwrap();
    let results = store.search(&sql).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, Path::new("/pics/IMG.PNG"));

    // none of these records point at real files
    let sql = pseudo::lookup("no_file").unwrap().expand(None, "").unwrap();
    assert_eq!(store.search(&sql).unwrap().len(), 3);

    let sql = pseudo::lookup("video").unwrap().expand(None, "").unwrap();
    let results = store.search(&sql).unwrap();
    assert_eq!(results[0].path, Path::new("/pics/clip.mp4"));
}
