//! Task relationship operations and unified cycle detection for
//! [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::RelationshipType;
use trellis_core::graph::DependencyGraph;
use trellis_core::relationship::TaskRelationship;

use crate::error::{Result, StoreError};
use crate::sqlite::store::{SqliteStore, decode_string_list, format_datetime, map_constraint_err, parse_datetime};
use crate::sqlite::tasks::get_task_on_conn;

/// All relationship columns in a deterministic order for SELECT queries.
pub(crate) const RELATIONSHIP_COLUMNS: &str =
    "id, from_task_id, to_task_id, relationship_type, created_at";

/// Deserialises a row into a [`TaskRelationship`]. Column order MUST match
/// [`RELATIONSHIP_COLUMNS`].
pub(crate) fn scan_relationship(row: &Row<'_>) -> rusqlite::Result<TaskRelationship> {
    let created_at_str: String = row.get("created_at")?;
    Ok(TaskRelationship {
        id: row.get("id")?,
        from_task_id: row.get("from_task_id")?,
        to_task_id: row.get("to_task_id")?,
        relationship_type: RelationshipType::from(
            row.get::<_, String>("relationship_type")?,
        ),
        created_at: parse_datetime(&created_at_str),
    })
}

// ---------------------------------------------------------------------------
// Unified cycle detection
// ---------------------------------------------------------------------------

/// Builds the unified prerequisite graph: every task's depends_on list plus
/// all blocking relationship edges, keyed by task key.
fn build_unified_graph(conn: &Connection) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();

    let mut stmt = conn.prepare("SELECT key, depends_on FROM tasks")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (key, deps) = row?;
        graph.insert(key, decode_string_list(&deps));
    }

    let mut stmt = conn.prepare(
        "SELECT t1.key, t2.key FROM task_relationships r
         JOIN tasks t1 ON r.from_task_id = t1.id
         JOIN tasks t2 ON r.to_task_id = t2.id
         WHERE r.relationship_type IN ('depends_on', 'blocks')",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (from, to) = row?;
        let mut prereqs = graph.prerequisites(&from).to_vec();
        if !prereqs.iter().any(|p| p == &to) {
            prereqs.push(to);
        }
        graph.insert(from, prereqs);
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Inserts a typed edge. Blocking kinds (`depends_on`, `blocks`) simulate the
/// would-be edge over the unified graph first and refuse cycles.
pub(crate) fn create_relationship_on_conn(
    conn: &Connection,
    from_task_id: i64,
    to_task_id: i64,
    relationship_type: &RelationshipType,
) -> Result<TaskRelationship> {
    let from = get_task_on_conn(conn, from_task_id)?;
    let to = get_task_on_conn(conn, to_task_id)?;

    if from_task_id == to_task_id {
        return Err(StoreError::SelfReference(from.key));
    }

    if relationship_type.is_blocking() {
        let graph = build_unified_graph(conn)?;
        graph.validate_dependency(&from.key, &to.key)?;
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO task_relationships (from_task_id, to_task_id, relationship_type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            from_task_id,
            to_task_id,
            relationship_type.as_str(),
            format_datetime(&now),
        ],
    )
    .map_err(|e| {
        map_constraint_err(
            e,
            "relationship",
            &format!("{} -> {} ({})", from.key, to.key, relationship_type),
        )
    })?;

    Ok(TaskRelationship {
        id: conn.last_insert_rowid(),
        from_task_id,
        to_task_id,
        relationship_type: relationship_type.clone(),
        created_at: now,
    })
}

// ---------------------------------------------------------------------------
// SqliteStore relationship methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn relationships_impl(
        &self,
        task_id: i64,
        relationship_type: Option<&RelationshipType>,
        outgoing: bool,
    ) -> Result<Vec<TaskRelationship>> {
        let conn = self.acquire()?;
        let anchor = if outgoing { "from_task_id" } else { "to_task_id" };

        let mut relationships = Vec::new();
        match relationship_type {
            Some(rel_type) => {
                let sql = format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM task_relationships
                     WHERE {anchor} = ?1 AND relationship_type = ?2
                     ORDER BY created_at, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![task_id, rel_type.as_str()], scan_relationship)?;
                for row in rows {
                    relationships.push(row?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM task_relationships
                     WHERE {anchor} = ?1 ORDER BY created_at, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![task_id], scan_relationship)?;
                for row in rows {
                    relationships.push(row?);
                }
            }
        }
        Ok(relationships)
    }

    pub(crate) fn delete_relationship_impl(&self, id: i64) -> Result<()> {
        let conn = self.acquire()?;
        let affected = conn.execute(
            "DELETE FROM task_relationships WHERE id = ?1",
            params![id],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found("relationship", id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn delete_relationship_by_triple_impl(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
    ) -> Result<()> {
        let conn = self.acquire()?;
        let affected = conn.execute(
            "DELETE FROM task_relationships
             WHERE from_task_id = ?1 AND to_task_id = ?2 AND relationship_type = ?3",
            params![from_task_id, to_task_id, relationship_type.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found(
                "relationship",
                format!("{from_task_id} -> {to_task_id} ({relationship_type})"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;
    use trellis_core::task::TaskBuilder;

    use crate::traits::Store;

    fn store_with_tasks(n: usize) -> (SqliteStore, Vec<i64>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let epic = store
            .create_epic(&EpicBuilder::new("Epic").key("E01").build(), &cancel)
            .unwrap();
        let feature = store
            .create_feature(
                &FeatureBuilder::new(epic.id, "Feature").key("E01-F01").build(),
                &cancel,
            )
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let task = store
                .create_task(
                    &TaskBuilder::new(feature.id, format!("Task {i}"))
                        .key(format!("T-E01-F01-{:03}", i + 1))
                        .build(),
                    &cancel,
                )
                .unwrap();
            ids.push(task.id);
        }
        (store, ids)
    }

    #[test]
    fn create_and_list_relationships() {
        let (store, ids) = store_with_tasks(2);
        let cancel = CancelToken::new();
        let rel = store
            .create_relationship(ids[0], ids[1], &RelationshipType::RelatesTo, &cancel)
            .unwrap();
        assert!(rel.id > 0);

        let outgoing = store.outgoing_relationships(ids[0], None).unwrap();
        assert_eq!(outgoing.len(), 1);
        let incoming = store.incoming_relationships(ids[1], None).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, rel.id);

        let filtered = store
            .outgoing_relationships(ids[0], Some(&RelationshipType::Blocks))
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn duplicate_triple_is_conflict() {
        let (store, ids) = store_with_tasks(2);
        let cancel = CancelToken::new();
        store
            .create_relationship(ids[0], ids[1], &RelationshipType::Blocks, &cancel)
            .unwrap();
        let err = store
            .create_relationship(ids[0], ids[1], &RelationshipType::Blocks, &cancel)
            .unwrap_err();
        assert!(err.is_conflict());

        // A different type between the same tasks is fine.
        store
            .create_relationship(ids[0], ids[1], &RelationshipType::RelatesTo, &cancel)
            .unwrap();
    }

    #[test]
    fn self_relationship_rejected() {
        let (store, ids) = store_with_tasks(1);
        let cancel = CancelToken::new();
        let err = store
            .create_relationship(ids[0], ids[0], &RelationshipType::DependsOn, &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::SelfReference(_)));
    }

    #[test]
    fn relationship_cycle_rejected_with_path() {
        let (store, ids) = store_with_tasks(3);
        let cancel = CancelToken::new();
        // A -> B, B -> C.
        store
            .create_relationship(ids[0], ids[1], &RelationshipType::DependsOn, &cancel)
            .unwrap();
        store
            .create_relationship(ids[1], ids[2], &RelationshipType::DependsOn, &cancel)
            .unwrap();

        // C -> A closes the loop.
        let err = store
            .create_relationship(ids[2], ids[0], &RelationshipType::DependsOn, &cancel)
            .unwrap_err();
        match err {
            StoreError::CircularDependency { path } => {
                assert!(path.contains(&"T-E01-F01-001".to_string()));
                assert!(path.contains(&"T-E01-F01-002".to_string()));
                assert!(path.contains(&"T-E01-F01-003".to_string()));
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn cycle_detection_spans_depends_on_lists() {
        let (store, ids) = store_with_tasks(2);
        let cancel = CancelToken::new();
        // 002 depends on 001 via the denormalized list.
        store
            .update_task(
                ids[1],
                &crate::traits::TaskUpdates {
                    depends_on: Some(vec!["T-E01-F01-001".into()]),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();

        // A blocks-edge 001 -> 002 would close the loop across both
        // representations.
        let err = store
            .create_relationship(ids[0], ids[1], &RelationshipType::Blocks, &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
    }

    #[test]
    fn non_blocking_types_skip_cycle_detection() {
        let (store, ids) = store_with_tasks(2);
        let cancel = CancelToken::new();
        store
            .create_relationship(ids[0], ids[1], &RelationshipType::DependsOn, &cancel)
            .unwrap();
        // relates_to in the reverse direction is not a cycle.
        store
            .create_relationship(ids[1], ids[0], &RelationshipType::RelatesTo, &cancel)
            .unwrap();
    }

    #[test]
    fn delete_by_id_and_triple() {
        let (store, ids) = store_with_tasks(2);
        let cancel = CancelToken::new();
        let rel = store
            .create_relationship(ids[0], ids[1], &RelationshipType::Duplicates, &cancel)
            .unwrap();
        store.delete_relationship(rel.id, &cancel).unwrap();
        assert!(store.outgoing_relationships(ids[0], None).unwrap().is_empty());

        store
            .create_relationship(ids[0], ids[1], &RelationshipType::Duplicates, &cancel)
            .unwrap();
        store
            .delete_relationship_by_triple(ids[0], ids[1], &RelationshipType::Duplicates, &cancel)
            .unwrap();
        let err = store
            .delete_relationship_by_triple(ids[0], ids[1], &RelationshipType::Duplicates, &cancel)
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
