use rusqlite::{params, Connection, Result};
const SCHEMA_VERSION: i32 = 2;

pub struct Migrator {
    conn: Connection,
}

impl Migrator {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn run_migrations(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current_version = self.current_version()?;
        log::info!("Current database schema version: {}", current_version);

        if current_version < SCHEMA_VERSION {
            log::info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);
            self.migrate_from(current_version)?;
        }

        Ok(())
    }

    pub fn current_version(&self) -> Result<i32> {
        let version: Option<i32> = self.conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version.unwrap_or(0))
    }

    fn migrate_from(&mut self, from_version: i32) -> Result<()> {
        let tx = self.conn.transaction()?;

        for version in (from_version + 1)..=SCHEMA_VERSION {
            log::info!("Applying migration to version {}", version);
            match version {
                1 => Self::migrate_to_v1_impl(&tx)?,
                2 => Self::migrate_to_v2_impl(&tx)?,
                _ => return Err(rusqlite::Error::InvalidQuery),
            }

            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![version],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn migrate_to_v1_impl(tx: &rusqlite::Transaction) -> Result<()> {
        tx.execute(
            "CREATE TABLE IF NOT EXISTS job (
                job_id TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                owner TEXT NOT NULL,
                jobset TEXT NOT NULL,
                priority REAL NOT NULL DEFAULT 0,
                submitted DATETIME NOT NULL,
                cancelled DATETIME,
                state INTEGER NOT NULL
            )",
            [],
        )?;

        tx.execute(
            "CREATE TABLE IF NOT EXISTS job_run (
                run_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                cluster TEXT NOT NULL,
                node TEXT,
                created DATETIME,
                started DATETIME,
                finished DATETIME,
                succeeded BOOLEAN,
                error TEXT,
                FOREIGN KEY (job_id) REFERENCES job(job_id) ON DELETE CASCADE
            )",
            [],
        )?;

        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_job_run_job_id ON job_run(job_id)",
            [],
        )?;

        Ok(())
    }

    fn migrate_to_v2_impl(tx: &rusqlite::Transaction) -> Result<()> {
        // Paging scans filter on queue and order on submission time.
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_job_queue ON job(queue)",
            [],
        )?;
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_job_submitted ON job(submitted, job_id)",
            [],
        )?;
        Ok(())
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
