use dialdesk::Database;
use uuid::Uuid;

/// Throwaway on-disk SQLite database, one per test so tests can run in
/// parallel. Files are removed on teardown.
pub struct TestDb {
    db: Database,
    path: String,
}

impl TestDb {
    pub fn db(&self) -> Database {
        self.db.clone()
    }
}

pub async fn setup_test_db() -> TestDb {
    // Install drivers for AnyPool (required for tests)
    sqlx::any::install_default_drivers();

    // Unique file per test for parallel execution
    let path = format!("test_{}.db", Uuid::new_v4());
    let db_url = format!("sqlite://{}?mode=rwc", path);

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");

    db.ensure_schema()
        .await
        .expect("Failed to create test schema");
    seed_directory(&db).await;

    TestDb { db, path }
}

/// A couple of known customers and CRM users the directory lookups resolve.
async fn seed_directory(db: &Database) {
    let pool = db.pool();

    sqlx::query(
        "INSERT INTO customers (id, cif_number, full_name, phone, segment)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind("cust-001")
    .bind("CIF900001")
    .bind("Tran Thi Mai")
    .bind("0901234567")
    .bind("premium")
    .execute(pool)
    .await
    .expect("Failed to seed customer cust-001");

    sqlx::query(
        "INSERT INTO customers (id, cif_number, full_name, phone, segment)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind("cust-002")
    .bind("CIF900002")
    .bind("Le Van Binh")
    .bind("0912345678")
    .bind("standard")
    .execute(pool)
    .await
    .expect("Failed to seed customer cust-002");

    sqlx::query("INSERT INTO users (id, username, full_name) VALUES (?, ?, ?)")
        .bind("user-agent-1")
        .bind("mai.nguyen")
        .bind("Nguyen Thi Mai")
        .execute(pool)
        .await
        .expect("Failed to seed user user-agent-1");

    sqlx::query("INSERT INTO users (id, username, full_name) VALUES (?, ?, ?)")
        .bind("user-agent-2")
        .bind("binh.pham")
        .bind("Pham Van Binh")
        .execute(pool)
        .await
        .expect("Failed to seed user user-agent-2");
}

pub async fn teardown_test_db(test_db: TestDb) {
    let TestDb { db, path } = test_db;
    drop(db);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{}-wal", path));
    let _ = std::fs::remove_file(format!("{}-shm", path));
}
