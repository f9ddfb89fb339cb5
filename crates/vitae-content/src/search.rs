//! Saved-search evaluation.
//!
//! Every filter is optional and skipped when empty. Category and region
//! filters use subset semantics: an item matches when none of its entries
//! fall outside the requested set, so `{A, B}` admits `{A}` and `[]` but not
//! `{A, C}`.

use chrono::{DateTime, Utc};
use rusqlite::ToSql;
use tracing::{debug, instrument};
use vitae_core::time;
use vitae_core::types::DateWindow;

use crate::error::Result;
use crate::store::{row_to_post, ContentStore, POST_COLUMNS, POST_COLUMN_COUNT};
use crate::types::{ParentSummary, PostKind, SearchHit};

/// What an alert asks for, plus the watermark it searches from.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub kind: PostKind,
    pub keywords: String,
    pub types: Vec<String>,
    pub regions: Vec<String>,
    pub location: String,
    pub dates: Option<DateWindow>,
    /// Only items published strictly after this instant match.
    pub cutoff: DateTime<Utc>,
}

impl SearchCriteria {
    /// Unfiltered search over one kind.
    pub fn new(kind: PostKind, cutoff: DateTime<Utc>) -> Self {
        Self {
            kind,
            keywords: String::new(),
            types: Vec::new(),
            regions: Vec::new(),
            location: String::new(),
            dates: None,
            cutoff,
        }
    }
}

/// Read-only query capability over the content corpus.
pub trait ContentSearch: Send + Sync {
    /// Published items matching `criteria`, featured first, then newest.
    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>>;
}

impl ContentSearch for ContentStore {
    #[instrument(skip(self, criteria), fields(kind = %criteria.kind))]
    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>> {
        let (sql, params) = build_query(criteria)?;
        let hits = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                row_to_hit,
            )?;
            let hits = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            hits
        };

        let hits = match location_needle(&criteria.location) {
            Some(needle) => hits
                .into_iter()
                .filter(|hit| hit.post.location_name.to_lowercase().contains(&needle))
                .collect(),
            None => hits,
        };
        debug!(matches = hits.len(), "search evaluated");
        Ok(hits)
    }
}

fn location_needle(location: &str) -> Option<String> {
    let trimmed = location.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Quote user keywords as a single FTS5 phrase so operators in the input
/// are matched literally.
fn fts_phrase(keywords: &str) -> Option<String> {
    let trimmed = keywords.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("\"{}\"", trimmed.replace('"', "\"\"")))
}

fn build_query(criteria: &SearchCriteria) -> Result<(String, Vec<Box<dyn ToSql>>)> {
    let mut sql = format!(
        "SELECT {POST_COLUMNS}, c.id, c.title, c.slug, c.image
         FROM posts p
         LEFT JOIN posts c
                ON p.kind = 'job' AND c.id = p.parent_id AND c.kind = 'company'
         WHERE p.kind = ? AND p.status = 'published'
           AND p.published_at IS NOT NULL AND p.published_at > ?"
    );
    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(criteria.kind.to_string()),
        Box::new(time::encode(criteria.cutoff)),
    ];

    if let Some(phrase) = fts_phrase(&criteria.keywords) {
        sql.push_str(" AND p.seq IN (SELECT rowid FROM posts_fts WHERE posts_fts MATCH ?)");
        params.push(Box::new(phrase));
    }

    for (column, filter) in [("types", &criteria.types), ("regions", &criteria.regions)] {
        if filter.is_empty() {
            continue;
        }
        sql.push_str(&format!(
            " AND NOT EXISTS (
                SELECT 1 FROM json_each(p.{column}) item
                WHERE item.value NOT IN (SELECT value FROM json_each(?)))"
        ));
        params.push(Box::new(serde_json::to_string(filter)?));
    }

    if let Some(window) = criteria.dates {
        let start = time::encode(window.start_of_window());
        let after = time::encode(window.after_window());
        if window.is_single_day() {
            // Anything running on that day.
            sql.push_str(
                " AND p.dates_start IS NOT NULL AND p.dates_start < ?
                  AND COALESCE(p.dates_end, p.dates_start) >= ?",
            );
            params.push(Box::new(after));
            params.push(Box::new(start));
        } else {
            // Fully contained in the window.
            sql.push_str(
                " AND p.dates_start IS NOT NULL AND p.dates_start >= ?
                  AND COALESCE(p.dates_end, p.dates_start) < ?",
            );
            params.push(Box::new(start));
            params.push(Box::new(after));
        }
    }

    sql.push_str(" ORDER BY p.featured DESC, p.published_at DESC, p.seq DESC");
    Ok((sql, params))
}

fn row_to_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    let post = row_to_post(row)?;
    let parent_id: Option<String> = row.get(POST_COLUMN_COUNT)?;
    let parent = match parent_id {
        Some(id) => Some(ParentSummary {
            id,
            title: row.get(POST_COLUMN_COUNT + 1)?,
            slug: row.get(POST_COLUMN_COUNT + 2)?,
            image: row.get(POST_COLUMN_COUNT + 3)?,
        }),
        None => None,
    };
    Ok(SearchHit { post, parent })
}
