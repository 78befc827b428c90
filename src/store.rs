use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    errors::BookingsHelperError,
    model::{Association, GlobalRule, MetaEntry, MetaValue, NewPost, PostType},
    schema::ensure_schema,
};

/// Raw `posts` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub id: i64,
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub parent: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub products: i64,
    pub resources: i64,
    pub persons: i64,
    pub meta_rows: i64,
    pub relationships: i64,
    pub rules: i64,
}

/// SQLite-backed store holding posts, post metadata, category terms, the
/// product/resource relationship table, the global rule table and options.
pub struct BookingStore {
    conn: Connection,
}

impl BookingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BookingsHelperError> {
        let conn =
            Connection::open(path).map_err(|e| BookingsHelperError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, BookingsHelperError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BookingsHelperError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts a post and returns its SQLite rowid.
    pub fn insert_post(&self, post: &NewPost) -> Result<i64, BookingsHelperError> {
        let affected = self
            .conn
            .execute(
                "INSERT INTO posts(post_type, post_status, post_title, post_content, post_excerpt, post_parent)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    post.post_type.as_str(),
                    post.status.as_str(),
                    post.title.as_str(),
                    post.content.as_str(),
                    post.excerpt.as_str(),
                    post.parent,
                ],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        if affected == 0 {
            return Err(BookingsHelperError::create_failed(format!(
                "no {} row written",
                post.post_type.as_str()
            )));
        }
        Ok(self.conn.last_insert_rowid())
    }

    pub fn post_status(&self, id: i64) -> Result<Option<String>, BookingsHelperError> {
        self.conn
            .query_row(
                "SELECT post_status FROM posts WHERE id=?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    pub fn get_post(
        &self,
        id: i64,
        post_type: PostType,
    ) -> Result<Option<PostRow>, BookingsHelperError> {
        self.conn
            .query_row(
                "SELECT id, post_type, post_status, post_title, post_content, post_excerpt, post_parent
                 FROM posts WHERE id=?1 AND post_type=?2",
                params![id, post_type.as_str()],
                row_to_post,
            )
            .optional()
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    pub fn children(
        &self,
        parent: i64,
        post_type: PostType,
    ) -> Result<Vec<PostRow>, BookingsHelperError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, post_type, post_status, post_title, post_content, post_excerpt, post_parent
                 FROM posts WHERE post_parent=?1 AND post_type=?2 ORDER BY id",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![parent, post_type.as_str()], row_to_post)
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| BookingsHelperError::query(e.to_string()))?);
        }
        Ok(result)
    }

    /// Ids of posts of `post_type` and `status` tagged with any of `terms`.
    pub fn posts_with_terms(
        &self,
        post_type: PostType,
        status: &str,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError> {
        let mut ids = Vec::new();
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT p.id FROM posts p
                 JOIN post_terms t ON t.post_id = p.id
                 WHERE p.post_type=?1 AND p.post_status=?2 AND t.taxonomy=?3 AND t.term=?4",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        for term in terms {
            let rows = stmt
                .query_map(params![post_type.as_str(), status, taxonomy, term], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(|e| BookingsHelperError::query(e.to_string()))?;
            for id in rows {
                ids.push(id.map_err(|e| BookingsHelperError::query(e.to_string()))?);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Ids of posts of `post_type` carrying `key` with any of `values`.
    pub fn posts_with_meta(
        &self,
        post_type: PostType,
        key: &str,
        values: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError> {
        let mut ids = Vec::new();
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT p.id FROM posts p
                 JOIN postmeta m ON m.post_id = p.id
                 WHERE p.post_type=?1 AND m.meta_key=?2 AND m.meta_value=?3",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        for value in values {
            let rows = stmt
                .query_map(params![post_type.as_str(), key, value], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(|e| BookingsHelperError::query(e.to_string()))?;
            for id in rows {
                ids.push(id.map_err(|e| BookingsHelperError::query(e.to_string()))?);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// All metadata rows of a post in insertion order.
    pub fn post_meta(&self, post_id: i64) -> Result<Vec<MetaEntry>, BookingsHelperError> {
        let mut stmt = self
            .conn
            .prepare("SELECT meta_key, meta_value FROM postmeta WHERE post_id=?1 ORDER BY meta_id")
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok(MetaEntry {
                    meta_key: row.get(0)?,
                    meta_value: row.get(1)?,
                })
            })
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| BookingsHelperError::query(e.to_string()))?);
        }
        Ok(result)
    }

    pub fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>, BookingsHelperError> {
        self.conn
            .query_row(
                "SELECT meta_value FROM postmeta WHERE post_id=?1 AND meta_key=?2 ORDER BY meta_id LIMIT 1",
                params![post_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    /// Writes `raw` as-is.
    pub fn add_meta_raw(
        &self,
        post_id: i64,
        key: &str,
        raw: &str,
    ) -> Result<i64, BookingsHelperError> {
        self.conn
            .execute(
                "INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES(?1, ?2, ?3)",
                params![post_id, key, raw],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &MetaValue,
    ) -> Result<i64, BookingsHelperError> {
        self.add_meta_raw(post_id, key, &value.to_stored())
    }

    /// Replaces every row of `key` on the post with a single row holding `value`.
    pub fn update_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &MetaValue,
    ) -> Result<(), BookingsHelperError> {
        self.conn
            .execute(
                "DELETE FROM postmeta WHERE post_id=?1 AND meta_key=?2",
                params![post_id, key],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        self.add_meta(post_id, key, value)?;
        Ok(())
    }

    pub fn terms(&self, post_id: i64, taxonomy: &str) -> Result<Vec<String>, BookingsHelperError> {
        let mut stmt = self
            .conn
            .prepare("SELECT term FROM post_terms WHERE post_id=?1 AND taxonomy=?2 ORDER BY rowid")
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![post_id, taxonomy], |row| row.get(0))
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| BookingsHelperError::query(e.to_string()))?);
        }
        Ok(result)
    }

    /// Replaces the post's terms in `taxonomy` with `terms`.
    pub fn set_terms(
        &self,
        post_id: i64,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<(), BookingsHelperError> {
        self.conn
            .execute(
                "DELETE FROM post_terms WHERE post_id=?1 AND taxonomy=?2",
                params![post_id, taxonomy],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        for term in terms {
            self.conn
                .execute(
                    "INSERT INTO post_terms(post_id, taxonomy, term) VALUES(?1, ?2, ?3)",
                    params![post_id, taxonomy, term],
                )
                .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        }
        Ok(())
    }

    /// Relationship rows of a product, ordered by sort position then row id.
    pub fn associations(&self, product_id: i64) -> Result<Vec<Association>, BookingsHelperError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, product_id, resource_id, sort_order FROM booking_relationships
                 WHERE product_id=?1 ORDER BY sort_order, id",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![product_id], |row| {
                Ok(Association {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    resource_id: row.get(2)?,
                    sort_order: row.get(3)?,
                })
            })
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| BookingsHelperError::query(e.to_string()))?);
        }
        Ok(result)
    }

    pub fn insert_association(
        &self,
        product_id: i64,
        resource_id: i64,
        sort_order: i64,
    ) -> Result<i64, BookingsHelperError> {
        self.conn
            .execute(
                "INSERT INTO booking_relationships(product_id, resource_id, sort_order) VALUES(?1, ?2, ?3)",
                params![product_id, resource_id, sort_order],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_association(&self, id: i64) -> Result<(), BookingsHelperError> {
        let affected = self
            .conn
            .execute("DELETE FROM booking_relationships WHERE id=?1", params![id])
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        if affected == 0 {
            return Err(BookingsHelperError::not_found(format!("relationship {id}")));
        }
        Ok(())
    }

    /// Rules from the dedicated table in their display order.
    pub fn rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, gcal_event_id, title, range_type, from_date, to_date, from_range, to_range,
                        bookable, priority, ordering, date_created, date_modified, rrule
                 FROM bookings_availability ORDER BY ordering, id",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_rule)
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| BookingsHelperError::query(e.to_string()))?);
        }
        Ok(result)
    }

    /// Empties the rule table and resets its id sequence.
    pub fn truncate_rules(&self) -> Result<(), BookingsHelperError> {
        self.conn
            .execute_batch(
                "DELETE FROM bookings_availability;
                 DELETE FROM sqlite_sequence WHERE name='bookings_availability';",
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    pub fn insert_rule(&self, rule: &GlobalRule) -> Result<i64, BookingsHelperError> {
        self.conn
            .execute(
                "INSERT INTO bookings_availability(gcal_event_id, title, range_type, from_date, to_date,
                     from_range, to_range, bookable, priority, ordering, date_created, date_modified, rrule)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    rule.gcal_event_id.as_deref().unwrap_or_default(),
                    rule.title,
                    rule.range_type,
                    rule.from_date,
                    rule.to_date,
                    rule.from_range,
                    rule.to_range,
                    rule.bookable,
                    rule.priority,
                    rule.ordering,
                    rule.date_created,
                    rule.date_modified,
                    rule.rrule.as_deref().unwrap_or_default(),
                ],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_option(&self, name: &str) -> Result<Option<String>, BookingsHelperError> {
        self.conn
            .query_row(
                "SELECT option_value FROM options WHERE option_name=?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    pub fn set_option(&self, name: &str, value: &str) -> Result<(), BookingsHelperError> {
        self.conn
            .execute(
                "INSERT INTO options(option_name, option_value) VALUES(?1, ?2)
                 ON CONFLICT(option_name) DO UPDATE SET option_value=excluded.option_value",
                params![name, value],
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        Ok(())
    }

    pub fn delete_option(&self, name: &str) -> Result<(), BookingsHelperError> {
        self.conn
            .execute("DELETE FROM options WHERE option_name=?1", params![name])
            .map_err(|e| BookingsHelperError::query(e.to_string()))?;
        Ok(())
    }

    pub fn begin(&self) -> Result<(), BookingsHelperError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| BookingsHelperError::transaction(e.to_string()))
    }

    pub fn commit(&self) -> Result<(), BookingsHelperError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| BookingsHelperError::transaction(e.to_string()))
    }

    pub fn rollback(&self) -> Result<(), BookingsHelperError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| BookingsHelperError::transaction(e.to_string()))
    }

    pub fn counts(&self) -> Result<StoreCounts, BookingsHelperError> {
        Ok(StoreCounts {
            products: self.count_posts(PostType::Product)?,
            resources: self.count_posts(PostType::Resource)?,
            persons: self.count_posts(PostType::Person)?,
            meta_rows: self.query_single("SELECT COUNT(*) FROM postmeta")?,
            relationships: self.query_single("SELECT COUNT(*) FROM booking_relationships")?,
            rules: self.query_single("SELECT COUNT(*) FROM bookings_availability")?,
        })
    }

    fn count_posts(&self, post_type: PostType) -> Result<i64, BookingsHelperError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM posts WHERE post_type=?1",
                params![post_type.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }

    fn query_single(&self, sql: &str) -> Result<i64, BookingsHelperError> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .optional()
            .map(|opt| opt.unwrap_or(0))
            .map_err(|e| BookingsHelperError::query(e.to_string()))
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> Result<PostRow, rusqlite::Error> {
    Ok(PostRow {
        id: row.get(0)?,
        post_type: row.get(1)?,
        status: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        excerpt: row.get(5)?,
        parent: row.get(6)?,
    })
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> Result<GlobalRule, rusqlite::Error> {
    let gcal_event_id: String = row.get(1)?;
    let rrule: String = row.get(13)?;
    Ok(GlobalRule {
        id: Some(row.get(0)?),
        gcal_event_id: Some(gcal_event_id).filter(|v| !v.is_empty()),
        title: row.get(2)?,
        range_type: row.get(3)?,
        from_date: row.get(4)?,
        to_date: row.get(5)?,
        from_range: row.get(6)?,
        to_range: row.get(7)?,
        bookable: row.get(8)?,
        priority: row.get(9)?,
        ordering: row.get(10)?,
        date_created: row.get(11)?,
        date_modified: row.get(12)?,
        rrule: Some(rrule).filter(|v| !v.is_empty()),
    })
}
