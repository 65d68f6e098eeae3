//! SQLite-backed provenance graph.
//!
//! Three tables in a single `context.db` using WAL mode: `events`,
//! `annotations` and `edges`. Events and annotations are append-only,
//! enforced by triggers; edges are upserted on `(source, target, relationship)`.

use crate::types::{
    Annotation, AnnotationType, Edge, Event, NewEvent, Relationship, SearchQuery, TimelineEntry,
    TimelineQuery,
};
use anyhow::Context;
use gitmap_core::now_timestamp;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT,
    repo TEXT NOT NULL,
    ref TEXT,
    payload TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_ref ON events(ref);

CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    event_id TEXT REFERENCES events(id),
    annotation_type TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'user',
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_event ON annotations(event_id);

CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relationship TEXT NOT NULL,
    metadata TEXT,
    PRIMARY KEY (source_id, target_id, relationship)
);

CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

CREATE TRIGGER IF NOT EXISTS events_no_update BEFORE UPDATE ON events
BEGIN SELECT RAISE(ABORT, 'events are append-only'); END;
CREATE TRIGGER IF NOT EXISTS events_no_delete BEFORE DELETE ON events
BEGIN SELECT RAISE(ABORT, 'events are append-only'); END;
CREATE TRIGGER IF NOT EXISTS annotations_no_update BEFORE UPDATE ON annotations
BEGIN SELECT RAISE(ABORT, 'annotations are append-only'); END;
CREATE TRIGGER IF NOT EXISTS annotations_no_delete BEFORE DELETE ON annotations
BEGIN SELECT RAISE(ABORT, 'annotations are append-only'); END;

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const EVENT_COLUMNS: &str = "e.id, e.timestamp, e.event_type, e.actor, e.repo, e.ref, e.payload";

const ANNOTATION_COLUMNS: &str = "id, event_id, annotation_type, content, source, timestamp";

/// Default `source` for annotations written on behalf of the user.
pub const USER_SOURCE: &str = "user";

pub struct ContextStore {
    conn: Connection,
}

impl ContextStore {
    /// Open or create `context.db` with the full schema.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening context store {}", db_path.display()))?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> anyhow::Result<u32> {
        let version: String = self.conn.query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )?;
        Ok(version.parse()?)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Append an event, plus a `rationale` annotation when one is given.
    pub fn record_event(&self, new: &NewEvent<'_>) -> anyhow::Result<Event> {
        let event = Event {
            id: new_id("evt"),
            timestamp: now_timestamp()?,
            event_type: new.event_type.to_string(),
            actor: new.actor.map(str::to_string),
            repo: new.repo.to_string(),
            reference: new.reference.map(str::to_string),
            payload: new.payload.clone(),
        };
        let payload = serde_json::to_string(&event.payload)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO events (id, timestamp, event_type, actor, repo, ref, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.timestamp,
                event.event_type,
                event.actor,
                event.repo,
                event.reference,
                payload,
            ],
        )?;
        if let Some(rationale) = new.rationale {
            insert_annotation(
                &tx,
                &Annotation {
                    id: new_id("ann"),
                    event_id: Some(event.id.clone()),
                    annotation_type: AnnotationType::Rationale,
                    content: rationale.to_string(),
                    source: USER_SOURCE.to_string(),
                    timestamp: event.timestamp.clone(),
                },
            )?;
        }
        tx.commit()?;

        tracing::debug!(event = %event.id, event_type = %event.event_type, "recorded event");
        Ok(event)
    }

    pub fn get_event(&self, id: &str) -> anyhow::Result<Option<Event>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?1"),
                params![id],
                read_event_row,
            )
            .optional()?;
        row.map(row_to_event).transpose()
    }

    /// Newest first.
    pub fn events_by_type(&self, event_type: &str, limit: usize) -> anyhow::Result<Vec<Event>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events e WHERE e.event_type = ?1
                 ORDER BY e.timestamp DESC, e.rowid DESC LIMIT ?2"
            ),
            vec![SqlValue::Text(event_type.to_string()), sql_limit(limit)],
        )
    }

    /// Newest first.
    pub fn events_by_ref(&self, reference: &str, limit: usize) -> anyhow::Result<Vec<Event>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events e WHERE e.ref = ?1
                 ORDER BY e.timestamp DESC, e.rowid DESC LIMIT ?2"
            ),
            vec![SqlValue::Text(reference.to_string()), sql_limit(limit)],
        )
    }

    pub fn latest_event_for_ref(&self, reference: &str) -> anyhow::Result<Option<Event>> {
        Ok(self.events_by_ref(reference, 1)?.into_iter().next())
    }

    fn query_events(&self, sql: &str, values: Vec<SqlValue>) -> anyhow::Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), read_event_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_event).collect()
    }

    // ── Annotations ─────────────────────────────────────────────────

    pub fn add_annotation(
        &self,
        event_id: Option<&str>,
        annotation_type: AnnotationType,
        content: &str,
        source: &str,
    ) -> anyhow::Result<Annotation> {
        let annotation = Annotation {
            id: new_id("ann"),
            event_id: event_id.map(str::to_string),
            annotation_type,
            content: content.to_string(),
            source: source.to_string(),
            timestamp: now_timestamp()?,
        };
        insert_annotation(&self.conn, &annotation)
            .with_context(|| format!("adding {annotation_type} annotation"))?;
        Ok(annotation)
    }

    /// Record a lesson learned, optionally tied to the event that taught it.
    pub fn record_lesson(
        &self,
        content: &str,
        event_id: Option<&str>,
        source: &str,
    ) -> anyhow::Result<Annotation> {
        self.add_annotation(event_id, AnnotationType::Lesson, content, source)
    }

    /// Oldest first.
    pub fn get_annotations(&self, event_id: &str) -> anyhow::Result<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations
             WHERE event_id = ?1 ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let rows = stmt
            .query_map(params![event_id], read_annotation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_annotation).collect()
    }

    // ── Edges ───────────────────────────────────────────────────────

    /// Insert an edge, or replace the metadata of the existing one.
    pub fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: Relationship,
        metadata: Option<&serde_json::Value>,
    ) -> anyhow::Result<Edge> {
        let metadata_str = metadata.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO edges (source_id, target_id, relationship, metadata)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source_id, target_id, relationship)
             DO UPDATE SET metadata = excluded.metadata",
            params![source_id, target_id, relationship.as_str(), metadata_str],
        )?;
        Ok(Edge {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relationship,
            metadata: metadata.cloned(),
        })
    }

    /// Every edge touching `event_id`, in either direction.
    pub fn get_edges(&self, event_id: &str) -> anyhow::Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, relationship, metadata FROM edges
             WHERE source_id = ?1 OR target_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![event_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_id, target_id, relationship, metadata)| {
                Ok(Edge {
                    source_id,
                    target_id,
                    relationship: relationship.parse()?,
                    metadata: parse_optional_json(metadata)?,
                })
            })
            .collect()
    }

    /// Events one edge away from `event_id`, with the connecting relationship.
    pub fn get_related_events(
        &self,
        event_id: &str,
        relationship: Option<Relationship>,
    ) -> anyhow::Result<Vec<(Event, Relationship)>> {
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS}, ed.relationship FROM edges ed
             JOIN events e ON e.id = CASE WHEN ed.source_id = ?1
                                          THEN ed.target_id ELSE ed.source_id END
             WHERE (ed.source_id = ?1 OR ed.target_id = ?1) AND e.id != ?1"
        );
        let mut values = vec![SqlValue::Text(event_id.to_string())];
        if let Some(rel) = relationship {
            sql.push_str(" AND ed.relationship = ?2");
            values.push(SqlValue::Text(rel.as_str().to_string()));
        }
        sql.push_str(" ORDER BY ed.rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((read_event_row(row)?, row.get::<_, String>(7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event, rel)| Ok((row_to_event(event)?, rel.parse()?)))
            .collect()
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Events whose payload or annotations contain `query`, newest first.
    pub fn search_events(&self, query: &SearchQuery) -> anyhow::Result<Vec<Event>> {
        let mut filter = Filter::default();
        let pattern = filter.bind(format!("%{}%", escape_like(&query.query)));
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e
             WHERE (e.payload LIKE {pattern} ESCAPE '\\'
                    OR EXISTS (SELECT 1 FROM annotations a
                               WHERE a.event_id = e.id AND a.content LIKE {pattern} ESCAPE '\\'))"
        );
        if !query.event_types.is_empty() {
            let slots: Vec<String> = query
                .event_types
                .iter()
                .map(|t| filter.bind(t.clone()))
                .collect();
            sql.push_str(&format!(" AND e.event_type IN ({})", slots.join(", ")));
        }
        filter.date_range(&mut sql, query.start.as_deref(), query.end.as_deref());
        let limit = filter.bind_value(sql_limit(query.limit));
        sql.push_str(&format!(
            " ORDER BY e.timestamp DESC, e.rowid DESC LIMIT {limit}"
        ));

        self.query_events(&sql, filter.values)
    }

    /// Events newest first, each with its annotations when requested.
    pub fn get_timeline(&self, query: &TimelineQuery) -> anyhow::Result<Vec<TimelineEntry>> {
        let mut filter = Filter::default();
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE 1=1");
        if let Some(reference) = &query.reference {
            let slot = filter.bind(reference.clone());
            sql.push_str(&format!(" AND e.ref = {slot}"));
        }
        filter.date_range(&mut sql, query.start.as_deref(), query.end.as_deref());
        let limit = filter.bind_value(sql_limit(query.limit));
        sql.push_str(&format!(
            " ORDER BY e.timestamp DESC, e.rowid DESC LIMIT {limit}"
        ));

        let events = self.query_events(&sql, filter.values)?;
        events
            .into_iter()
            .map(|event| {
                let annotations = if query.include_annotations {
                    Some(self.get_annotations(&event.id)?)
                } else {
                    None
                };
                Ok(TimelineEntry { event, annotations })
            })
            .collect()
    }
}

impl Drop for ContextStore {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            tracing::debug!(error = %e, "wal checkpoint on close failed");
        }
    }
}

/// Numbered SQL parameters collected while a query string is built.
#[derive(Default)]
struct Filter {
    values: Vec<SqlValue>,
}

impl Filter {
    fn bind(&mut self, value: String) -> String {
        self.bind_value(SqlValue::Text(value))
    }

    fn bind_value(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("?{}", self.values.len())
    }

    fn date_range(&mut self, sql: &mut String, start: Option<&str>, end: Option<&str>) {
        if let Some(start) = start {
            let slot = self.bind(start.to_string());
            sql.push_str(&format!(" AND e.timestamp >= {slot}"));
        }
        if let Some(end) = end {
            let slot = self.bind(end.to_string());
            sql.push_str(&format!(" AND e.timestamp <= {slot}"));
        }
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", ulid::Ulid::new().to_string().to_lowercase())
}

fn sql_limit(limit: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX))
}

/// Escape LIKE wildcards so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn insert_annotation(conn: &Connection, annotation: &Annotation) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO annotations (id, event_id, annotation_type, content, source, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            annotation.id,
            annotation.event_id,
            annotation.annotation_type.as_str(),
            annotation.content,
            annotation.source,
            annotation.timestamp,
        ],
    )?;
    Ok(())
}

fn parse_optional_json(raw: Option<String>) -> anyhow::Result<Option<serde_json::Value>> {
    Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
}

struct EventRow {
    id: String,
    timestamp: String,
    event_type: String,
    actor: Option<String>,
    repo: String,
    reference: Option<String>,
    payload_str: String,
}

fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        event_type: row.get(2)?,
        actor: row.get(3)?,
        repo: row.get(4)?,
        reference: row.get(5)?,
        payload_str: row.get(6)?,
    })
}

fn row_to_event(row: EventRow) -> anyhow::Result<Event> {
    let payload = serde_json::from_str(&row.payload_str)
        .with_context(|| format!("event {} has an unreadable payload", row.id))?;
    Ok(Event {
        id: row.id,
        timestamp: row.timestamp,
        event_type: row.event_type,
        actor: row.actor,
        repo: row.repo,
        reference: row.reference,
        payload,
    })
}

struct AnnotationRow {
    id: String,
    event_id: Option<String>,
    annotation_type: String,
    content: String,
    source: String,
    timestamp: String,
}

fn read_annotation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnotationRow> {
    Ok(AnnotationRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        annotation_type: row.get(2)?,
        content: row.get(3)?,
        source: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn row_to_annotation(row: AnnotationRow) -> anyhow::Result<Annotation> {
    Ok(Annotation {
        id: row.id,
        event_id: row.event_id,
        annotation_type: row.annotation_type.parse()?,
        content: row.content,
        source: row.source,
        timestamp: row.timestamp,
    })
}
