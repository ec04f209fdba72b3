use crate::model::{Category, ClassRecord, Gradebook};
use crate::scale::{GradingScale, ScaleEntry};
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DB_FILE: &str = "gradebook.sqlite3";
pub const SCHEMA_VERSION: i64 = 1;

pub const SETTING_DEFAULT_SCALE: &str = "scale.default";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    ensure_schema_version(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            rounding_enabled INTEGER NOT NULL DEFAULT 0,
            rounding_threshold REAL NOT NULL DEFAULT 0,
            extra_credit REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scale_entries(
            class_id TEXT NOT NULL,
            cutoff REAL NOT NULL,
            label TEXT NOT NULL,
            PRIMARY KEY(class_id, cutoff),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            num_dropped INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_class ON categories(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            category_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY(category_id, idx),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_schema_version(conn: &Connection) -> anyhow::Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    match stored {
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) => {
            let version: i64 = v
                .trim()
                .parse()
                .with_context(|| format!("unreadable schema version {:?}", v))?;
            if version > SCHEMA_VERSION {
                return Err(anyhow!(
                    "workspace schema version {} is newer than supported version {}",
                    version,
                    SCHEMA_VERSION
                ));
            }
        }
    }
    Ok(())
}

pub fn load_gradebook(conn: &Connection) -> anyhow::Result<Gradebook> {
    let mut class_stmt = conn.prepare(
        "SELECT id, name, rounding_enabled, rounding_threshold, extra_credit
         FROM classes
         ORDER BY sort_order",
    )?;
    let class_rows = class_stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)? != 0,
                r.get::<_, f64>(3)?,
                r.get::<_, f64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut scale_stmt =
        conn.prepare("SELECT cutoff, label FROM scale_entries WHERE class_id = ?")?;
    let mut cat_stmt = conn.prepare(
        "SELECT id, name, weight, num_dropped
         FROM categories
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let mut grade_stmt =
        conn.prepare("SELECT value FROM grades WHERE category_id = ? ORDER BY idx")?;

    let mut book = Gradebook::new();
    for (class_id, name, rounding_enabled, rounding_threshold, extra_credit) in class_rows {
        let mut record = ClassRecord::new(name.clone());

        let entries = scale_stmt
            .query_map([&class_id], |r| {
                Ok(ScaleEntry {
                    cutoff: r.get(0)?,
                    label: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let scale = GradingScale::new(entries)
            .with_context(|| format!("invalid grading scale stored for class {:?}", name))?;
        record.set_scale(scale);
        record.set_rounding(rounding_enabled, rounding_threshold);
        record
            .add_extra_credit(extra_credit)
            .with_context(|| format!("invalid extra credit stored for class {:?}", name))?;

        let cats = cat_stmt
            .query_map([&class_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (cat_id, cat_name, weight, num_dropped) in cats {
            let num_dropped = usize::try_from(num_dropped)
                .with_context(|| format!("negative drop count for category {:?}", cat_name))?;
            let mut category = Category::new(cat_name, weight, num_dropped);
            let grades = grade_stmt
                .query_map([&cat_id], |r| r.get::<_, f64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for g in grades {
                category.add_grade(g);
            }
            record.add_category(category)?;
        }

        book.add_class(record)?;
    }

    Ok(book)
}

/// Rewrites the whole gradebook in one transaction.
pub fn save_gradebook(conn: &Connection, book: &Gradebook) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;

    // Dependency order; no ON DELETE CASCADE.
    tx.execute("DELETE FROM grades", [])?;
    tx.execute("DELETE FROM categories", [])?;
    tx.execute("DELETE FROM scale_entries", [])?;
    tx.execute("DELETE FROM classes", [])?;

    for (class_order, record) in book.classes().iter().enumerate() {
        let class_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO classes(id, name, sort_order, rounding_enabled, rounding_threshold, extra_credit)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &class_id,
                record.name(),
                class_order as i64,
                record.rounding_enabled() as i64,
                record.rounding_threshold(),
                record.extra_credit(),
            ),
        )?;

        for e in record.scale().entries() {
            tx.execute(
                "INSERT INTO scale_entries(class_id, cutoff, label) VALUES(?, ?, ?)",
                (&class_id, e.cutoff, &e.label),
            )?;
        }

        for (cat_order, c) in record.categories().iter().enumerate() {
            let cat_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO categories(id, class_id, name, weight, num_dropped, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &cat_id,
                    &class_id,
                    c.name(),
                    c.weight(),
                    c.num_dropped() as i64,
                    cat_order as i64,
                ),
            )?;
            for (idx, g) in c.grades().iter().enumerate() {
                tx.execute(
                    "INSERT INTO grades(category_id, idx, value) VALUES(?, ?, ?)",
                    (&cat_id, idx as i64, *g),
                )?;
            }
        }
    }

    tx.commit()?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is invalid JSON", key))?,
        )),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Workspace default scale; the built-in table when unset or unreadable.
pub fn default_scale(conn: &Connection) -> GradingScale {
    match settings_get_json(conn, SETTING_DEFAULT_SCALE) {
        Ok(Some(v)) => match serde_json::from_value::<GradingScale>(v) {
            Ok(scale) => scale,
            Err(e) => {
                tracing::warn!(error = %e, "stored default scale is invalid; using built-in scale");
                GradingScale::default()
            }
        },
        Ok(None) => GradingScale::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read default scale; using built-in scale");
            GradingScale::default()
        }
    }
}

pub struct OpenedWorkspace {
    pub conn: Connection,
    pub gradebook: Gradebook,
    pub recovered_from: Option<PathBuf>,
}

fn open_and_load(workspace: &Path) -> anyhow::Result<(Connection, Gradebook)> {
    let conn = open_db(workspace)?;
    let book = load_gradebook(&conn)?;
    Ok((conn, book))
}

/// Opens the workspace database and loads the gradebook. A database that
/// cannot be opened or loaded is moved aside and replaced by an empty one.
pub fn open_workspace(workspace: &Path) -> anyhow::Result<OpenedWorkspace> {
    match open_and_load(workspace) {
        Ok((conn, gradebook)) => Ok(OpenedWorkspace {
            conn,
            gradebook,
            recovered_from: None,
        }),
        Err(load_err) => {
            let src = db_path(workspace);
            if !src.exists() {
                return Err(load_err);
            }
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
            let aside = workspace.join(format!("{}.corrupt-{}", DB_FILE, stamp));
            let detail = format!("{load_err:#}");
            tracing::warn!(
                error = %detail,
                moved_to = %aside.to_string_lossy(),
                "workspace database unreadable; starting with an empty gradebook"
            );
            std::fs::rename(&src, &aside).with_context(|| {
                format!("failed to move aside {}", src.to_string_lossy())
            })?;
            let conn = open_db(workspace).context("failed to create fresh workspace database")?;
            Ok(OpenedWorkspace {
                conn,
                gradebook: Gradebook::new(),
                recovered_from: Some(aside),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn sample_book() -> Gradebook {
        let mut book = Gradebook::new();

        let mut chem = ClassRecord::new("Chemistry");
        chem.set_rounding(true, 0.5);
        chem.add_extra_credit(2.25).expect("extra credit");
        let mut labs = Category::new("Labs", 40.0, 1);
        for g in [88.0, 72.5, 95.0] {
            labs.add_grade(g);
        }
        chem.add_category(labs).expect("category");
        chem.add_category(Category::new("Exams", 60.0, 0)).expect("category");
        book.add_class(chem).expect("class");

        let mut art = ClassRecord::new("Art");
        art.set_scale(
            GradingScale::new(vec![ScaleEntry::new(0.0, "Fail"), ScaleEntry::new(65.0, "Pass")])
                .expect("scale"),
        );
        let mut projects = Category::new("Projects", 100.0, 0);
        projects.add_grade(64.99);
        art.add_category(projects).expect("category");
        book.add_class(art).expect("class");

        book
    }

    #[test]
    fn gradebook_roundtrips_exactly() {
        let workspace = temp_dir("gradebook-db-roundtrip");
        let conn = open_db(&workspace).expect("open db");
        let book = sample_book();
        save_gradebook(&conn, &book).expect("save");
        let loaded = load_gradebook(&conn).expect("load");
        assert_eq!(loaded, book);

        // Saving twice must not duplicate rows.
        save_gradebook(&conn, &loaded).expect("save again");
        assert_eq!(load_gradebook(&conn).expect("load"), book);

        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn garbage_file_is_moved_aside() {
        let workspace = temp_dir("gradebook-db-corrupt");
        std::fs::write(db_path(&workspace), b"this is not a sqlite database at all....")
            .expect("write garbage");
        let opened = open_workspace(&workspace).expect("recover");
        assert!(opened.gradebook.classes().is_empty());
        let aside = opened.recovered_from.expect("recovered path");
        assert!(aside.is_file());
        assert!(db_path(&workspace).is_file());

        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn newer_schema_version_is_recovered() {
        let workspace = temp_dir("gradebook-db-newer");
        {
            let conn = open_db(&workspace).expect("open db");
            save_gradebook(&conn, &sample_book()).expect("save");
            conn.execute(
                "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
                [],
            )
            .expect("bump version");
        }
        let opened = open_workspace(&workspace).expect("recover");
        assert!(opened.recovered_from.is_some());
        assert!(opened.gradebook.classes().is_empty());

        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn default_scale_setting_roundtrips() {
        let workspace = temp_dir("gradebook-db-settings");
        let conn = open_db(&workspace).expect("open db");
        assert_eq!(default_scale(&conn), GradingScale::default());

        let pf = GradingScale::new(vec![ScaleEntry::new(0.0, "F"), ScaleEntry::new(50.0, "P")])
            .expect("scale");
        settings_set_json(
            &conn,
            SETTING_DEFAULT_SCALE,
            &serde_json::to_value(&pf).expect("to json"),
        )
        .expect("set");
        assert_eq!(default_scale(&conn), pf);

        let _ = std::fs::remove_dir_all(workspace);
    }
}
