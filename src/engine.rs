// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Refinement engine: queue selection, skip recycling, completion and chains
//!
//! The free functions operate on a connection so they can be combined inside
//! one transaction. [`RefinementEngine`] wraps each logical operation in its
//! own transaction.

use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::ImageCatalog;
use crate::config::RefineConfig;
use crate::db::{self, Database, Rating, Refinement, RefinementItem, SourceRef};
use crate::{RefineError, Result};

/// Longest refinement chain that will be followed back to its folder
pub const MAX_CHAIN_DEPTH: usize = 32;

/// Outcome of asking for the next item to rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Rate this item next
    Continue(RefinementItem),
    /// Nothing left to rate; the refinement is complete
    Exhausted,
}

/// Pending item with the smallest id. When nothing is pending but items were
/// skipped, every skip goes back to pending first.
pub fn next_item(conn: &Connection, refinement_id: i64) -> Result<Option<RefinementItem>> {
    if let Some(item) = db::first_pending(conn, refinement_id)? {
        return Ok(Some(item));
    }

    let recycled = db::recycle_skips(conn, refinement_id)?;
    if recycled == 0 {
        return Ok(None);
    }
    debug!("Recycled {} skipped items in refinement {}", recycled, refinement_id);
    db::first_pending(conn, refinement_id)
}

/// Select the next item, completing the refinement when the queue is empty
fn advance(conn: &Connection, refinement_id: i64) -> Result<Step> {
    match next_item(conn, refinement_id)? {
        Some(item) => Ok(Step::Continue(item)),
        None => {
            if db::mark_complete(conn, refinement_id)? {
                info!("Refinement {} complete", refinement_id);
            }
            Ok(Step::Exhausted)
        }
    }
}

/// Rate an item and move on. Complete refinements reject ratings.
pub fn rate(conn: &Connection, refinement_id: i64, item_id: i64, rating: Rating) -> Result<Step> {
    let refinement = db::get_refinement(conn, refinement_id)?;
    if refinement.is_complete() {
        return Err(RefineError::InvalidState(format!(
            "refinement {} is already complete",
            refinement_id
        )));
    }

    db::rate_item(conn, item_id, refinement_id, rating)?;
    advance(conn, refinement_id)
}

/// Item to show now. Complete refinements are left untouched.
pub fn current_item(conn: &Connection, refinement_id: i64) -> Result<Step> {
    let refinement = db::get_refinement(conn, refinement_id)?;
    if refinement.is_complete() {
        return Ok(Step::Exhausted);
    }
    advance(conn, refinement_id)
}

/// Follow source links from `refinement_id` until a folder is reached.
/// Returns the refinements visited (starting one first) and the folder name.
pub fn walk_chain(conn: &Connection, refinement_id: i64) -> Result<(Vec<Refinement>, String)> {
    let mut visited = HashSet::new();
    let mut chain = Vec::new();
    let mut current = refinement_id;

    loop {
        if chain.len() == MAX_CHAIN_DEPTH {
            return Err(RefineError::ChainTooDeep(refinement_id, MAX_CHAIN_DEPTH));
        }
        if !visited.insert(current) {
            return Err(RefineError::CycleDetected(current));
        }

        let refinement = db::get_refinement(conn, current)?;
        let next = match &refinement.source {
            SourceRef::Folder(folder) => {
                let folder = folder.clone();
                chain.push(refinement);
                return Ok((chain, folder));
            }
            SourceRef::Refinement(parent) => *parent,
        };
        chain.push(refinement);
        current = next;
    }
}

pub fn resolve_root_folder(conn: &Connection, refinement_id: i64) -> Result<String> {
    walk_chain(conn, refinement_id).map(|(_, folder)| folder)
}

/// Name for a new refinement; blank names get one derived from the source
fn refinement_name(name: &str, fallback: impl FnOnce() -> String) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

/// Transactional front end to the refinement state machine
#[derive(Clone)]
pub struct RefinementEngine {
    db: Database,
    catalog: Arc<dyn ImageCatalog>,
    config: RefineConfig,
}

impl RefinementEngine {
    pub fn new(db: Database, catalog: Arc<dyn ImageCatalog>, config: RefineConfig) -> Self {
        Self { db, catalog, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Create a refinement, snapshotting its source atomically
    pub fn start_refinement(&self, source: &SourceRef, name: &str) -> Result<i64> {
        let id = match source {
            SourceRef::Folder(folder) => {
                let images = self.catalog.list_images(folder)?;
                let name = refinement_name(name, || folder.clone());
                self.db
                    .with_tx(|tx| db::create_refinement(tx, &name, source, &images))?
            }
            SourceRef::Refinement(source_id) => self.db.with_tx(|tx| {
                let parent = db::get_refinement(tx, *source_id)?;
                if self.config.require_complete_source && !parent.is_complete() {
                    return Err(RefineError::InvalidState(format!(
                        "refinement {} must be complete before it can be refined",
                        parent.id
                    )));
                }
                // Never extend a broken chain
                resolve_root_folder(tx, parent.id)?;

                let relpaths = db::yes_items(tx, parent.id)?;
                let name = refinement_name(name, || format!("{} refined", parent.name));
                db::create_refinement(tx, &name, source, &relpaths)
            })?,
        };
        info!("Started refinement {} from {}", id, source.label());
        Ok(id)
    }

    pub fn get_refinement(&self, id: i64) -> Result<Refinement> {
        self.db.get_refinement(id)
    }

    pub fn next_item(&self, refinement_id: i64) -> Result<Option<RefinementItem>> {
        self.db.with_tx(|tx| {
            db::get_refinement(tx, refinement_id)?;
            next_item(tx, refinement_id)
        })
    }

    pub fn current_item(&self, refinement_id: i64) -> Result<Step> {
        self.db.with_tx(|tx| current_item(tx, refinement_id))
    }

    pub fn rate(&self, refinement_id: i64, item_id: i64, rating: Rating) -> Result<Step> {
        self.db.with_tx(|tx| rate(tx, refinement_id, item_id, rating))
    }

    pub fn resolve_root_folder(&self, refinement_id: i64) -> Result<String> {
        self.db.with_tx(|tx| resolve_root_folder(tx, refinement_id))
    }

    pub fn chain(&self, refinement_id: i64) -> Result<Vec<Refinement>> {
        self.db.with_tx(|tx| walk_chain(tx, refinement_id).map(|(chain, _)| chain))
    }

    /// Yes-rated relpaths paired with the folder they live in
    pub fn yes_collection(&self, refinement_id: i64) -> Result<(String, Vec<String>)> {
        self.db.with_tx(|tx| {
            db::get_refinement(tx, refinement_id)?;
            let folder = resolve_root_folder(tx, refinement_id)?;
            Ok((folder, db::yes_items(tx, refinement_id)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RefinementStatus;
    use rusqlite::params;

    /// Catalog serving fixed listings from memory
    struct StaticCatalog(Vec<(&'static str, Vec<&'static str>)>);

    impl ImageCatalog for StaticCatalog {
        fn list_collections(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|(f, _)| f.to_string()).collect())
        }

        fn list_images(&self, folder: &str) -> Result<Vec<String>> {
            self.0
                .iter()
                .find(|(f, _)| *f == folder)
                .map(|(_, names)| names.iter().map(|n| n.to_string()).collect())
                .ok_or_else(|| RefineError::NotFound(folder.to_string()))
        }

        fn image_path(&self, folder: &str, name: &str) -> Result<std::path::PathBuf> {
            Ok(std::path::PathBuf::from(folder).join(name))
        }
    }

    fn engine_with(config: RefineConfig) -> RefinementEngine {
        let catalog = StaticCatalog(vec![
            ("beach", vec!["a.jpg", "b.jpg", "c.jpg"]),
            ("empty", vec![]),
        ]);
        RefinementEngine::new(Database::in_memory().unwrap(), Arc::new(catalog), config)
    }

    fn engine() -> RefinementEngine {
        engine_with(RefineConfig::default())
    }

    fn item_id(engine: &RefinementEngine, refinement_id: i64, relpath: &str) -> i64 {
        engine
            .db()
            .items(refinement_id)
            .unwrap()
            .into_iter()
            .find(|i| i.relpath == relpath)
            .unwrap()
            .id
    }

    fn relpath(step: &Step) -> &str {
        match step {
            Step::Continue(item) => &item.relpath,
            Step::Exhausted => panic!("expected an item"),
        }
    }

    /// Insert a refinement row directly, bypassing validation
    fn raw_refinement(engine: &RefinementEngine, source_type: &str, source_key: &str) -> i64 {
        engine
            .db()
            .with_tx(|tx| {
                tx.execute(
                    r#"INSERT INTO refinements (name, source_type, source_key, status, created_at)
                       VALUES ('raw', ?1, ?2, 'active', '2025-01-01T00:00:00.000000Z')"#,
                    params![source_type, source_key],
                )?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap()
    }

    fn set_source_key(engine: &RefinementEngine, id: i64, key: &str) {
        engine
            .db()
            .with_tx(|tx| {
                tx.execute("UPDATE refinements SET source_key = ?1 WHERE id = ?2", params![key, id])?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_beach_scenario() {
        let engine = engine();
        let r1 = engine.start_refinement(&SourceRef::Folder("beach".into()), "Beach").unwrap();
        assert_eq!(engine.db().items(r1).unwrap().len(), 3);

        let step = engine.current_item(r1).unwrap();
        assert_eq!(relpath(&step), "a.jpg");

        let step = engine.rate(r1, item_id(&engine, r1, "a.jpg"), Rating::Yes).unwrap();
        assert_eq!(relpath(&step), "b.jpg");
        let step = engine.rate(r1, item_id(&engine, r1, "b.jpg"), Rating::Skip).unwrap();
        assert_eq!(relpath(&step), "c.jpg");

        // c is the last pending item, so b comes back
        let step = engine.rate(r1, item_id(&engine, r1, "c.jpg"), Rating::No).unwrap();
        assert_eq!(relpath(&step), "b.jpg");
        assert_eq!(engine.db().progress(r1).unwrap().skipped, 0);

        let step = engine.rate(r1, item_id(&engine, r1, "b.jpg"), Rating::Yes).unwrap();
        assert_eq!(step, Step::Exhausted);

        let refinement = engine.get_refinement(r1).unwrap();
        assert_eq!(refinement.status, RefinementStatus::Complete);
        assert_eq!(engine.db().yes_items(r1).unwrap(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_refine_a_refinement() {
        let engine = engine();
        let r1 = engine.start_refinement(&SourceRef::Folder("beach".into()), "").unwrap();
        engine.rate(r1, item_id(&engine, r1, "a.jpg"), Rating::Yes).unwrap();
        engine.rate(r1, item_id(&engine, r1, "b.jpg"), Rating::Yes).unwrap();
        engine.rate(r1, item_id(&engine, r1, "c.jpg"), Rating::No).unwrap();

        let r2 = engine.start_refinement(&SourceRef::Refinement(r1), "  Best of  ").unwrap();
        let refinement = engine.get_refinement(r2).unwrap();
        assert_eq!(refinement.name, "Best of");
        assert_eq!(refinement.source, SourceRef::Refinement(r1));
        assert_eq!(refinement.source.key(), r1.to_string());

        let snapshot: Vec<String> = engine.db().items(r2).unwrap().into_iter().map(|i| i.relpath).collect();
        assert_eq!(snapshot, vec!["a.jpg", "b.jpg"]);
        assert_eq!(engine.resolve_root_folder(r2).unwrap(), "beach");
        assert_eq!(engine.get_refinement(r1).unwrap().name, "beach");
    }

    #[test]
    fn test_depth_three_chain_resolves_to_folder() {
        let engine = engine();
        let a = engine.start_refinement(&SourceRef::Folder("beach".into()), "A").unwrap();
        let b = engine.start_refinement(&SourceRef::Refinement(a), "B").unwrap();
        let c = engine.start_refinement(&SourceRef::Refinement(b), "C").unwrap();

        assert_eq!(engine.resolve_root_folder(c).unwrap(), "beach");
        let ids: Vec<i64> = engine.chain(c).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let engine = engine();
        let id = raw_refinement(&engine, "refinement", "0");
        set_source_key(&engine, id, &id.to_string());
        assert!(matches!(engine.resolve_root_folder(id), Err(RefineError::CycleDetected(x)) if x == id));
    }

    #[test]
    fn test_two_step_cycle() {
        let engine = engine();
        let a = raw_refinement(&engine, "refinement", "0");
        let b = raw_refinement(&engine, "refinement", &a.to_string());
        set_source_key(&engine, a, &b.to_string());
        assert!(matches!(engine.resolve_root_folder(b), Err(RefineError::CycleDetected(_))));
    }

    #[test]
    fn test_missing_link() {
        let engine = engine();
        let id = raw_refinement(&engine, "refinement", "999");
        assert!(matches!(engine.resolve_root_folder(id), Err(RefineError::NotFound(_))));
    }

    #[test]
    fn test_malformed_link() {
        let engine = engine();
        let id = raw_refinement(&engine, "refinement", "beach");
        assert!(matches!(
            engine.resolve_root_folder(id),
            Err(RefineError::CorruptChain { refinement_id, .. }) if refinement_id == id
        ));
    }

    #[test]
    fn test_chain_depth_limit() {
        let engine = engine();
        let mut id = engine.start_refinement(&SourceRef::Folder("beach".into()), "root").unwrap();
        // root plus 31 links is exactly the limit
        for _ in 1..MAX_CHAIN_DEPTH {
            id = raw_refinement(&engine, "refinement", &id.to_string());
        }
        assert_eq!(engine.resolve_root_folder(id).unwrap(), "beach");

        let too_deep = raw_refinement(&engine, "refinement", &id.to_string());
        assert!(matches!(
            engine.resolve_root_folder(too_deep),
            Err(RefineError::ChainTooDeep(start, MAX_CHAIN_DEPTH)) if start == too_deep
        ));
    }

    #[test]
    fn test_rating_foreign_item_is_ignored() {
        let engine = engine();
        let r1 = engine.start_refinement(&SourceRef::Folder("beach".into()), "one").unwrap();
        let r2 = engine.start_refinement(&SourceRef::Folder("beach".into()), "two").unwrap();
        let foreign = item_id(&engine, r2, "a.jpg");

        let step = engine.rate(r1, foreign, Rating::Yes).unwrap();
        assert_eq!(relpath(&step), "a.jpg");
        assert!(engine.db().items(r2).unwrap().iter().all(|i| i.rating.is_none()));
        assert!(engine.db().items(r1).unwrap().iter().all(|i| i.rating.is_none()));
    }

    #[test]
    fn test_complete_refinement_rejects_ratings() {
        let engine = engine();
        let id = engine.start_refinement(&SourceRef::Folder("beach".into()), "x").unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            engine.rate(id, item_id(&engine, id, name), Rating::No).unwrap();
        }
        assert!(engine.get_refinement(id).unwrap().is_complete());

        let a = item_id(&engine, id, "a.jpg");
        assert!(matches!(engine.rate(id, a, Rating::Yes), Err(RefineError::InvalidState(_))));
        assert!(engine.db().yes_items(id).unwrap().is_empty());
        assert_eq!(engine.current_item(id).unwrap(), Step::Exhausted);
        assert!(engine.get_refinement(id).unwrap().is_complete());
    }

    #[test]
    fn test_all_skips_keep_recycling() {
        let engine = engine();
        let id = engine.start_refinement(&SourceRef::Folder("beach".into()), "x").unwrap();
        for _ in 0..2 {
            for name in ["a.jpg", "b.jpg", "c.jpg"] {
                let step = engine.rate(id, item_id(&engine, id, name), Rating::Skip).unwrap();
                assert!(matches!(step, Step::Continue(_)));
            }
        }
        assert!(!engine.get_refinement(id).unwrap().is_complete());
        assert_eq!(engine.db().progress(id).unwrap().pending, 3);
    }

    #[test]
    fn test_next_item_never_returns_rated() {
        let engine = engine();
        let id = engine.start_refinement(&SourceRef::Folder("beach".into()), "x").unwrap();
        engine.rate(id, item_id(&engine, id, "a.jpg"), Rating::Yes).unwrap();
        engine.rate(id, item_id(&engine, id, "b.jpg"), Rating::Skip).unwrap();

        let item = engine.next_item(id).unwrap().unwrap();
        assert_eq!(item.relpath, "c.jpg");
        assert_eq!(item.rating, None);
        // next_item alone does not consume anything
        assert_eq!(engine.next_item(id).unwrap().unwrap().id, item.id);
    }

    #[test]
    fn test_snapshot_never_changes() {
        let engine = engine();
        let id = engine.start_refinement(&SourceRef::Folder("beach".into()), "x").unwrap();
        let before: HashSet<String> = engine.db().items(id).unwrap().into_iter().map(|i| i.relpath).collect();
        for (name, rating) in [("b.jpg", Rating::Skip), ("a.jpg", Rating::No), ("c.jpg", Rating::Skip)] {
            engine.rate(id, item_id(&engine, id, name), rating).unwrap();
        }
        let after: HashSet<String> = engine.db().items(id).unwrap().into_iter().map(|i| i.relpath).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_source_completes_on_first_view() {
        let engine = engine();
        let id = engine.start_refinement(&SourceRef::Folder("empty".into()), "").unwrap();
        assert_eq!(engine.current_item(id).unwrap(), Step::Exhausted);
        assert!(engine.get_refinement(id).unwrap().is_complete());
    }

    #[test]
    fn test_missing_sources() {
        let engine = engine();
        assert!(matches!(
            engine.start_refinement(&SourceRef::Folder("nowhere".into()), ""),
            Err(RefineError::NotFound(_))
        ));
        assert!(matches!(
            engine.start_refinement(&SourceRef::Refinement(77), ""),
            Err(RefineError::NotFound(_))
        ));
        assert!(matches!(engine.current_item(77), Err(RefineError::NotFound(_))));
    }

    #[test]
    fn test_require_complete_source() {
        let engine = engine_with(RefineConfig { require_complete_source: true });
        let r1 = engine.start_refinement(&SourceRef::Folder("beach".into()), "").unwrap();
        assert!(matches!(
            engine.start_refinement(&SourceRef::Refinement(r1), ""),
            Err(RefineError::InvalidState(_))
        ));

        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            engine.rate(r1, item_id(&engine, r1, name), Rating::Yes).unwrap();
        }
        let r2 = engine.start_refinement(&SourceRef::Refinement(r1), "").unwrap();
        assert_eq!(engine.get_refinement(r2).unwrap().name, "beach refined");
    }

    #[test]
    fn test_broken_chain_is_not_extended() {
        let engine = engine();
        let id = raw_refinement(&engine, "refinement", "999");
        assert!(matches!(
            engine.start_refinement(&SourceRef::Refinement(id), ""),
            Err(RefineError::NotFound(_))
        ));
        assert_eq!(engine.db().list_active_refinements().unwrap().len(), 1);
    }

    #[test]
    fn test_yes_collection_uses_root_folder() {
        let engine = engine();
        let r1 = engine.start_refinement(&SourceRef::Folder("beach".into()), "").unwrap();
        engine.rate(r1, item_id(&engine, r1, "c.jpg"), Rating::Yes).unwrap();
        let r2 = engine.start_refinement(&SourceRef::Refinement(r1), "").unwrap();
        engine.rate(r2, item_id(&engine, r2, "c.jpg"), Rating::Yes).unwrap();

        let (folder, names) = engine.yes_collection(r2).unwrap();
        assert_eq!(folder, "beach");
        assert_eq!(names, vec!["c.jpg"]);
    }
}
