use sqlx::PgPool;

/// 建表语句, 可重复执行
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tw_invoice (
        id              TEXT PRIMARY KEY,
        invoice_number  TEXT NOT NULL,
        vendor_name     TEXT NOT NULL,
        invoice_date    DATE NOT NULL,
        total_amount    NUMERIC NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tw_purchase_order (
        id              TEXT PRIMARY KEY,
        po_number       TEXT NOT NULL,
        vendor_name     TEXT NOT NULL,
        po_date         DATE NOT NULL,
        total_amount    NUMERIC NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tw_goods_receipt (
        id              TEXT PRIMARY KEY,
        gr_number       TEXT NOT NULL,
        po_number       TEXT NOT NULL,
        vendor_name     TEXT NOT NULL,
        receipt_date    DATE NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tw_document_line (
        document_kind   TEXT NOT NULL,
        document_id     TEXT NOT NULL,
        line_no         INT NOT NULL,
        description     TEXT NOT NULL,
        quantity        NUMERIC NOT NULL,
        unit_price      NUMERIC,
        amount          NUMERIC,
        PRIMARY KEY (document_kind, document_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tw_verification_result (
        id                    TEXT PRIMARY KEY,
        invoice_id            TEXT NOT NULL,
        po_id                 TEXT NOT NULL,
        gr_id                 TEXT NOT NULL,
        total_variance        NUMERIC NOT NULL,
        price_variance        NUMERIC NOT NULL,
        quantity_variance     NUMERIC NOT NULL,
        declared_total_delta  NUMERIC NOT NULL,
        overall_status        TEXT NOT NULL,
        created_at            TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tw_verification_result_created
        ON tw_verification_result (created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tw_line_item_match (
        result_id         TEXT NOT NULL REFERENCES tw_verification_result (id),
        seq               INT NOT NULL,
        description       TEXT NOT NULL,
        invoice_qty       NUMERIC,
        invoice_price     NUMERIC,
        invoice_amount    NUMERIC,
        po_qty            NUMERIC,
        po_price          NUMERIC,
        po_amount         NUMERIC,
        gr_qty            NUMERIC,
        quantity_delta    NUMERIC,
        price_delta       NUMERIC,
        quantity_ratio    NUMERIC,
        price_ratio       NUMERIC,
        amount_variance   NUMERIC NOT NULL,
        amount_mismatch   BOOLEAN NOT NULL,
        status            TEXT NOT NULL,
        PRIMARY KEY (result_id, seq)
    )
    "#,
];

/// 启动时建表
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Schema ready ({} statements)", SCHEMA.len());
    Ok(())
}
