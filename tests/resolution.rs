use std::sync::Arc;

use asset_binder::dynamic::{HostTexture, TextureDescriptor, TextureFactory};
use asset_binder::entry::{
    Asset3dEntry, AssetEntry, EntryKind, ListReference, ResourceEntry, VariantsEntry,
};
use asset_binder::events::AssetEvent;
use asset_binder::prelude::{AssetDatabase, AssetHost, DatabaseConfig, ResourceList};

struct NoTextures;

impl TextureFactory for NoTextures {
    fn create(&self, _descriptor: &TextureDescriptor) -> Arc<dyn HostTexture> {
        unreachable!("resolution tests never create textures")
    }
}

fn furniture() -> ResourceList {
    let mut list = ResourceList::new("Furniture");
    let root = list.resources();
    let chair = list
        .add(root, ResourceEntry::new("Chair", EntryKind::Variants(VariantsEntry::default())))
        .unwrap();
    for wood in ["Oak", "Pine", "Steel"] {
        let asset = Asset3dEntry::new(AssetEntry::new(format!("/Game/Chairs/{wood}")));
        list.add(chair, ResourceEntry::new(wood, EntryKind::Asset3d(asset)))
            .unwrap();
    }
    list.add(root, ResourceEntry::new("Table", EntryKind::Asset(AssetEntry::new("/Game/Table"))))
        .unwrap();
    list
}

fn database() -> AssetDatabase {
    let db = AssetDatabase::new(DatabaseConfig::default(), Arc::new(NoTextures));
    db.insert_list(furniture());
    db.set_root("Furniture");
    db
}

#[test]
fn test_variant_lookup_reuses_range_without_rewalk() {
    let db = database();

    let second = db.resolve("Furniture.Chair#2");
    let walks = db.stats().tree_walks;
    assert_eq!(walks, 1);

    let first = db.resolve("Furniture.Chair#1");
    assert_eq!(second.get(), first.get() + 1);
    assert_eq!(db.stats().tree_walks, walks);

    let resolved = db.entry(first).unwrap();
    assert_eq!(resolved.entry.name, "Oak");
    assert_eq!(resolved.variant, Some(1));
}

#[test]
fn test_resolve_is_idempotent() {
    let db = database();
    for descriptor in ["Furniture.Table", "Furniture.Chair#3", "Furniture.Nope", "Furniture.Chair"] {
        assert_eq!(db.resolve(descriptor), db.resolve(descriptor));
    }
}

#[test]
fn test_variant_range_is_contiguous() {
    let db = database();
    let ids: Vec<u32> = (1..=3)
        .map(|n| db.resolve(&format!("Furniture.Chair#{n}")).get())
        .collect();
    assert_eq!(ids[1], ids[0] + 1);
    assert_eq!(ids[2], ids[0] + 2);
    assert!(db.is_bad(db.resolve("Furniture.Chair#4")));
    assert_eq!(db.stats().variant_ranges, 1);
}

#[test]
fn test_invalidate_bumps_version_and_recomputes() {
    let db = database();
    let rx = db.subscribe();
    let before = db.resolve("Furniture.Table");
    let version = db.cache_version();

    db.invalidate();
    assert!(db.cache_version() > version);
    assert_eq!(rx.try_recv(), Ok(AssetEvent::Invalidated { version: db.cache_version() }));
    assert!(db.entry(before).is_none());

    let walks = db.stats().tree_walks;
    let after = db.resolve("Furniture.Table");
    assert_ne!(before, after);
    assert!(after.get() > before.get());
    assert_eq!(db.stats().tree_walks, walks + 1);
}

#[test]
fn test_sentinel_shared_within_generation() {
    let db = database();
    let a = db.resolve("Furniture.Sofa");
    let b = db.resolve("Garden.Bench");
    assert_eq!(a, b);
    assert!(!db.check_valid("Furniture.Sofa"));
    assert_eq!(db.entry(a).unwrap().entry.name, "missing resource");

    db.invalidate();
    let c = db.resolve("Furniture.Sofa");
    assert!(db.is_bad(c));
    assert!(!db.is_bad(a));
    assert_ne!(a, c);
}

#[test]
fn test_missing_descriptors_aggregated_once() {
    let db = database();
    for _ in 0..3 {
        db.resolve("Furniture.Sofa");
        db.resolve("Furniture.Chair#9");
    }
    assert_eq!(db.missing(), vec!["Furniture.Sofa", "Furniture.Chair#9"]);

    db.invalidate();
    assert!(db.missing().is_empty());
}

#[test]
fn test_missing_not_recorded_when_disabled() {
    let config = DatabaseConfig {
        record_missing: false,
        root_list: Some("Furniture".to_string()),
        ..DatabaseConfig::default()
    };
    let db = AssetDatabase::new(config, Arc::new(NoTextures));
    db.insert_list(furniture());
    assert!(db.check_valid("Furniture.Table"));
    assert!(!db.check_valid("Furniture.Sofa"));
    assert!(db.missing().is_empty());
}

#[test]
fn test_reference_cycles_terminate() {
    let db = database();
    for (name, target) in [("Left", "Right"), ("Right", "Left")] {
        let mut list = ResourceList::new(name);
        let refs = list.references_root();
        list.add(
            refs,
            ResourceEntry::new(target, EntryKind::ListReference(ListReference { list: target.into() })),
        )
        .unwrap();
        if name == "Right" {
            let furniture_ref = ListReference { list: "Furniture".into() };
            list.add(refs, ResourceEntry::new("Furniture", EntryKind::ListReference(furniture_ref)))
                .unwrap();
        }
        db.insert_list(list);
    }
    db.set_root("Left");

    assert!(db.is_bad(db.resolve("Left.Anything")));
    let table = db.resolve("Furniture.Table");
    assert!(!db.is_bad(table));
    assert_eq!(db.entry(table).unwrap().list, "Furniture");
}

#[test]
fn test_host_callbacks() {
    let db = database();
    let host: &dyn AssetHost = &db;
    assert_eq!(host.asset_variants("Furniture.Chair"), 3);
    assert_eq!(host.asset_variants("Furniture.Chair#2"), 3);
    assert_eq!(host.asset_variants("Furniture.Table"), 0);
    assert!(host.check_asset_valid("Furniture.Chair#3"));
    assert!(!host.check_asset_valid("Furniture.Chair#0"));

    let bounds = host.asset_bounds("Furniture.Chair#1").unwrap();
    assert_eq!(bounds.size, glam::Vec3::splat(100.0));
    assert!(host.asset_bounds("Furniture.Table").is_none());
    assert_eq!(host.asset_id("Furniture.Table"), db.resolve("Furniture.Table"));
}

#[test]
fn test_resolve_from_worker_threads() {
    let db = database();
    let ids: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| db.resolve("Furniture.Chair#2")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(db.stats().variant_ranges, 1);
}
