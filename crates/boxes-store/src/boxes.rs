use boxes_core::filter::{Bound, Condition, Measure};
use boxes_core::time::format_timestamp;
use boxes_core::{AggregateSource, BoxFilter, BoxId, BoxPatch, BoxRecord, NewBox, Owner, Scope, UserId};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{count, parse_ts};

const SELECT_BOXES: &str = "SELECT b.id, b.owner_id, u.username, b.length, b.breadth, b.height, b.created_at, b.updated_at
     FROM boxes b JOIN users u ON u.id = b.owner_id";

/// Box persistence. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct BoxRepo {
    db: Database,
}

impl BoxRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, owner), fields(owner_id = %owner.id))]
    pub fn insert(&self, owner: &Owner, new: &NewBox, now: DateTime<Utc>) -> Result<BoxRecord, StoreError> {
        let ts = format_timestamp(now);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO boxes (owner_id, length, breadth, height, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![owner.id.get(), new.length, new.breadth, new.height, ts],
            )?;
            Ok(BoxRecord {
                id: BoxId::from_raw(conn.last_insert_rowid()),
                owner: owner.clone(),
                length: new.length,
                breadth: new.breadth,
                height: new.height,
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn get(&self, id: BoxId) -> Result<BoxRecord, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(&format!("{SELECT_BOXES} WHERE b.id = ?1"), [id.get()], raw_box)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("box {id}")))?
                .into_record()
        })
    }

    /// Apply `patch` and refresh `updated_at`. Owner and creation time are
    /// never written.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: BoxId, patch: &BoxPatch, now: DateTime<Utc>) -> Result<BoxRecord, StoreError> {
        let mut record = self.get(id)?;
        patch.apply(&mut record);
        record.updated_at = now;

        self.db.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE boxes SET length = ?1, breadth = ?2, height = ?3, updated_at = ?4 WHERE id = ?5",
                rusqlite::params![
                    record.length,
                    record.breadth,
                    record.height,
                    format_timestamp(now),
                    id.get(),
                ],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("box {id}")));
            }
            Ok(())
        })?;
        Ok(record)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: BoxId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM boxes WHERE id = ?1", [id.get()])?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("box {id}")));
            }
            Ok(())
        })
    }

    /// Filtered read over the box collection, ordered by id.
    #[instrument(skip(self, filter))]
    pub fn list(&self, scope: Scope, filter: &BoxFilter) -> Result<Vec<BoxRecord>, StoreError> {
        let (where_sql, params) = build_where(scope, filter);
        let sql = format!("{SELECT_BOXES} WHERE 1=1{where_sql} ORDER BY b.id");

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(param_refs.as_slice(), raw_box)?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawBox::into_record).collect()
        })
    }
}

impl AggregateSource for BoxRepo {
    type Error = StoreError;

    fn average_volume(&self) -> Result<Option<f64>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT AVG(length * breadth * height) FROM boxes", [], |row| {
                row.get::<_, Option<f64>>(0)
            })?)
        })
    }

    fn count_created_since(&self, since: DateTime<Utc>, owner: Option<UserId>) -> Result<u64, StoreError> {
        let since = format_timestamp(since);
        self.db.with_conn(|conn| {
            let raw: i64 = match owner {
                None => conn.query_row(
                    "SELECT COUNT(*) FROM boxes WHERE created_at >= ?1",
                    [&since],
                    |row| row.get(0),
                )?,
                Some(owner) => conn.query_row(
                    "SELECT COUNT(*) FROM boxes WHERE created_at >= ?1 AND owner_id = ?2",
                    rusqlite::params![since, owner.get()],
                    |row| row.get(0),
                )?,
            };
            count(raw, "boxes")
        })
    }
}

/// Render scope and filter conditions as ` AND ...` clauses with positional
/// parameters.
fn build_where(scope: Scope, filter: &BoxFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = String::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Scope::Owner(owner) = scope {
        params.push(Box::new(owner.get()));
        sql.push_str(&format!(" AND b.owner_id = ?{}", params.len()));
    }

    for condition in filter.conditions() {
        match condition {
            Condition::Range { measure, bound, value } => {
                let op = match bound {
                    Bound::Above => ">",
                    Bound::Below => "<",
                };
                params.push(Box::new(value));
                sql.push_str(&format!(" AND {} {op} ?{}", measure_sql(measure), params.len()));
            }
            Condition::PositiveDimensions => {
                sql.push_str(" AND b.length > 0 AND b.breadth > 0 AND b.height > 0");
            }
            Condition::OwnerUsername(name) => {
                params.push(Box::new(name));
                sql.push_str(&format!(" AND u.username = ?{}", params.len()));
            }
            Condition::CreatedFrom(ts) => {
                params.push(Box::new(format_timestamp(ts)));
                sql.push_str(&format!(" AND b.created_at >= ?{}", params.len()));
            }
            Condition::CreatedUntil(ts) => {
                params.push(Box::new(format_timestamp(ts)));
                sql.push_str(&format!(" AND b.created_at <= ?{}", params.len()));
            }
        }
    }
    (sql, params)
}

fn measure_sql(measure: Measure) -> &'static str {
    match measure {
        Measure::Length => "b.length",
        Measure::Breadth => "b.breadth",
        Measure::Height => "b.height",
        Measure::Area => "(b.length * b.breadth)",
        Measure::Volume => "(b.length * b.breadth * b.height)",
    }
}

struct RawBox {
    id: i64,
    owner_id: i64,
    username: String,
    length: f64,
    breadth: f64,
    height: f64,
    created_at: String,
    updated_at: String,
}

fn raw_box(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBox> {
    Ok(RawBox {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        username: row.get(2)?,
        length: row.get(3)?,
        breadth: row.get(4)?,
        height: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RawBox {
    fn into_record(self) -> Result<BoxRecord, StoreError> {
        Ok(BoxRecord {
            id: BoxId::from_raw(self.id),
            owner: Owner {
                id: UserId::from_raw(self.owner_id),
                username: self.username,
            },
            length: self.length,
            breadth: self.breadth,
            height: self.height,
            created_at: parse_ts(&self.created_at, "boxes", "created_at")?,
            updated_at: parse_ts(&self.updated_at, "boxes", "updated_at")?,
        })
    }
}
