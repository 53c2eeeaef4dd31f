//! SQL schema for the HDL SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS persons (
    person_id           TEXT PRIMARY KEY,
    person_number       TEXT NOT NULL UNIQUE,
    full_name           TEXT NOT NULL,
    source_system_owner TEXT NOT NULL,
    source_system_id    TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents_of_record (
    document_id         TEXT PRIMARY KEY,
    person_id           TEXT NOT NULL REFERENCES persons(person_id),
    person_number       TEXT NOT NULL,
    document_type       TEXT NOT NULL,
    document_code       TEXT NOT NULL,
    document_name       TEXT NOT NULL,
    source_system_owner TEXT NOT NULL,
    source_system_id    TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (person_number, document_type, document_code)
);

-- At most one attachment per document; replaced wholesale on re-delivery.
CREATE TABLE IF NOT EXISTS document_attachments (
    document_id         TEXT PRIMARY KEY REFERENCES documents_of_record(document_id),
    person_number       TEXT NOT NULL,
    document_type       TEXT NOT NULL,
    document_code       TEXT NOT NULL,
    title               TEXT NOT NULL,
    file_name           TEXT NOT NULL,
    file_content        BLOB NOT NULL,
    file_size           INTEGER NOT NULL,
    source_system_owner TEXT NOT NULL,
    source_system_id    TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS external_identifiers (
    identifier_id                TEXT PRIMARY KEY,
    person_id                    TEXT NOT NULL REFERENCES persons(person_id),
    person_number                TEXT NOT NULL,
    external_identifier_sequence INTEGER NOT NULL,
    external_identifier_number   TEXT NOT NULL,
    external_identifier_type     TEXT NOT NULL,
    date_from                    TEXT NOT NULL,   -- YYYY-MM-DD
    source_system_owner          TEXT NOT NULL,
    source_system_id             TEXT NOT NULL,
    updated_at                   TEXT NOT NULL,
    UNIQUE (person_number, external_identifier_type, external_identifier_sequence)
);

-- Insert-only: no natural key, re-delivery duplicates rows.
CREATE TABLE IF NOT EXISTS person_accrual_details (
    accrual_id          TEXT PRIMARY KEY,
    person_id           TEXT NOT NULL REFERENCES persons(person_id),
    person_number       TEXT NOT NULL,
    accrual_plan        TEXT NOT NULL,
    accrual_type        TEXT NOT NULL,
    accrual_date        TEXT NOT NULL,   -- YYYY-MM-DD
    hours               REAL NOT NULL,
    source_system_owner TEXT NOT NULL,
    source_system_id    TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hdl_import_log (
    import_id       TEXT PRIMARY KEY,
    file_name       TEXT NOT NULL,
    file_type       TEXT NOT NULL,
    hdl_object      TEXT NOT NULL,   -- SchemaKind discriminant
    status          TEXT NOT NULL
                    CHECK (status IN ('PROCESSING', 'COMPLETED', 'FAILED')),
    records_total   INTEGER NOT NULL DEFAULT 0,
    records_success INTEGER NOT NULL DEFAULT 0,
    records_failed  INTEGER NOT NULL DEFAULT 0,
    error_message   TEXT,
    payload_sha256  TEXT,
    started_at      TEXT NOT NULL,   -- ISO 8601 UTC
    completed_at    TEXT
);

CREATE INDEX IF NOT EXISTS documents_person_idx   ON documents_of_record(person_number);
CREATE INDEX IF NOT EXISTS identifiers_person_idx ON external_identifiers(person_number);
CREATE INDEX IF NOT EXISTS accruals_person_idx    ON person_accrual_details(person_number);
CREATE INDEX IF NOT EXISTS import_log_started_idx ON hdl_import_log(started_at);

PRAGMA user_version = 1;
";
