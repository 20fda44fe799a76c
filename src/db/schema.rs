use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Audit purchase requests. One row per checkout initiation; rows are
        -- never deleted by the service. Status transitions are enforced here
        -- with conditional UPDATEs, not just in application code, so
        -- concurrent duplicate webhook deliveries cannot race each other.
        CREATE TABLE IF NOT EXISTS audit_requests (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            company_name TEXT NOT NULL,
            social_handles TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'payment_received', 'payment_failed',
                                  'planning', 'in_progress', 'review', 'completed')),
            stripe_payment_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_requests_status ON audit_requests(status);
        CREATE INDEX IF NOT EXISTS idx_audit_requests_email ON audit_requests(email);
        -- One payment reference belongs to at most one record. A forged or
        -- misrouted event that would attach a claimed reference to a second
        -- record fails the write instead of corrupting the audit trail.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_audit_requests_payment_ref
            ON audit_requests(stripe_payment_id) WHERE stripe_payment_id IS NOT NULL;

        -- Webhook events (for replay attack prevention)
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_created ON webhook_events(created_at);
        "#,
    )?;
    Ok(())
}
